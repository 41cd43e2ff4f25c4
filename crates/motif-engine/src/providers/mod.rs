mod groq;
mod prodia;
mod replicate;

pub use groq::{rewrite_instruction, RewriteClient};
pub use prodia::ProdiaClient;
pub use replicate::ReplicateClient;
