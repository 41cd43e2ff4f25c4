use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use motif_contracts::events::EventWriter;
use motif_contracts::summary::write_summary;
use motif_contracts::{
    ColorStyle, ColorizationMode, DataUri, FilterChain, RepeatMode, TileParameters,
};
use motif_engine::color::bake_filter_chain;
use motif_engine::compositor::{encode_jpeg, TILE_JPEG_QUALITY};
use motif_engine::{
    BrandBlacklist, GatewayConfig, ImageService, InferenceGateway, Studio, StudioOptions,
    TileCompositor, UpscaleFactor, Viewport, DEFAULT_PROMPT_PREPEND,
};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "motif", version, about = "Seamless pattern studio")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the JSON gateway over HTTP.
    Serve(ServeArgs),
    /// Run one headless session and write its artifacts to a directory.
    Run(RunArgs),
    /// Composite a local image into a tile.
    Tile(TileArgs),
    /// Run text through the prompt sanitizer.
    Sanitize(SanitizeArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: SocketAddr,
}

#[derive(Debug, Clone, Args)]
struct ColorArgs {
    #[arg(long, default_value = "original")]
    colorization: ColorizationMode,
    #[arg(long, default_value_t = 0)]
    hue: u32,
    #[arg(long, default_value = "vibrant")]
    style: ColorStyle,
    #[arg(long, default_value_t = 50)]
    brightness: u32,
}

impl ColorArgs {
    fn apply(&self, params: &mut TileParameters) -> Result<()> {
        params.set_colorization(self.colorization);
        params.set_color_style(self.style);
        params.set_hue(self.hue)?;
        params.set_brightness(self.brightness)?;
        Ok(())
    }
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Edit instruction applied after generating; repeatable.
    #[arg(long = "iterate")]
    iterations: Vec<String>,
    #[arg(long)]
    upscale: Option<u32>,
    #[arg(long, default_value = "prodia")]
    upscale_provider: String,
    #[arg(long)]
    prepend: Option<String>,
    #[arg(long, default_value_t = 0)]
    crop: u32,
    #[arg(long, default_value = "mirrored")]
    repeat_mode: RepeatMode,
    #[command(flatten)]
    color: ColorArgs,
    #[arg(long, default_value_t = 40)]
    zoom: u32,
    #[arg(long, default_value_t = 0)]
    rotation: u32,
    #[arg(long, default_value_t = 1280.0)]
    viewport_width: f64,
    #[arg(long, default_value_t = 800.0)]
    viewport_height: f64,
    /// Also write the tile with the colour treatment baked in.
    #[arg(long)]
    bake: bool,
}

#[derive(Debug, Parser)]
struct TileArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 0)]
    crop: u32,
    #[arg(long, default_value = "mirrored")]
    repeat_mode: RepeatMode,
    #[command(flatten)]
    color: ColorArgs,
    #[arg(long, default_value_t = TILE_JPEG_QUALITY)]
    quality: u8,
}

#[derive(Debug, Parser)]
struct SanitizeArgs {
    text: String,
    /// Strip brand names after rewriting.
    #[arg(long)]
    strip_brands: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("motif error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Serve(args) => run_serve(args).await,
            Command::Run(args) => run_session(args).await,
            Command::Tile(args) => run_tile(args).await,
            Command::Sanitize(args) => run_sanitize(args).await,
        }
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let gateway = InferenceGateway::new(GatewayConfig::from_env())?;
    let listener = TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("failed to bind {}", args.addr))?;
    motif_engine::server::serve(listener, gateway).await
}

async fn run_session(args: RunArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let gateway = InferenceGateway::new(GatewayConfig::from_env())?;
    let upscale_backend = gateway.resolve_upscaler(Some(&args.upscale_provider))?;
    let upscale_factor = args.upscale.map(UpscaleFactor::try_from).transpose()?;

    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = uuid::Uuid::new_v4().to_string();
    let options = StudioOptions {
        prompt_prepend: args
            .prepend
            .clone()
            .unwrap_or_else(|| DEFAULT_PROMPT_PREPEND.to_string()),
        upscale_backend,
        viewport: Viewport::new(args.viewport_width, args.viewport_height),
        ..StudioOptions::default()
    };
    info!(session_id = %session_id, out = %args.out.display(), "session started");
    let mut studio = Studio::new(gateway, options, EventWriter::new(events_path, session_id));

    let outcome = drive_session(&mut studio, &args, upscale_factor).await;
    write_artifacts(&studio, &args.out, args.bake)?;

    let summary = studio.finish_session();
    let mut extra = Map::new();
    extra.insert("prompt".to_string(), Value::String(args.prompt.clone()));
    extra.insert(
        "out_dir".to_string(),
        Value::String(args.out.display().to_string()),
    );
    write_summary(&args.out.join("summary.json"), &summary, Some(&extra))?;
    outcome
}

async fn drive_session<S: ImageService>(
    studio: &mut Studio<S>,
    args: &RunArgs,
    upscale_factor: Option<UpscaleFactor>,
) -> Result<()> {
    studio.generate(&args.prompt).await.context("generate failed")?;
    for instruction in &args.iterations {
        studio
            .iterate(instruction)
            .await
            .with_context(|| format!("iterate `{instruction}` failed"))?;
    }
    if let Some(factor) = upscale_factor {
        studio.upscale(factor).await.context("upscale failed")?;
    }
    studio.set_repeat_mode(args.repeat_mode).await?;
    studio.set_crop_percent(args.crop).await?;
    studio.set_colorization(args.color.colorization)?;
    studio.set_color_style(args.color.style)?;
    studio.set_hue(args.color.hue)?;
    studio.set_brightness(args.color.brightness)?;
    studio.set_zoom_percent(args.zoom)?;
    studio.set_rotation_degrees(args.rotation)?;
    Ok(())
}

/// Writes the source, the tile and its background style, plus the baked tile
/// when asked. Nothing is written before the first image exists.
fn write_artifacts<S: ImageService>(studio: &Studio<S>, out: &Path, bake: bool) -> Result<()> {
    let state = studio.state();
    if let Some(source) = state.source() {
        let name = format!("source.{}", source.image().extension());
        write_data_uri(&out.join(name), source.image())?;
    }
    let Some(tile) = state.tile() else {
        return Ok(());
    };
    let tile_name = format!("tile.{}", tile.image().extension());
    write_data_uri(&out.join(&tile_name), tile.image())?;
    if let Some(style) = studio.background() {
        let style = style.with_image_url(&tile_name);
        fs::write(out.join("style.json"), serde_json::to_string_pretty(&style)?)
            .context("failed to write style.json")?;
    }
    if bake {
        if let Some(baked) = studio.baked_tile()? {
            write_data_uri(&out.join("tile-baked.jpg"), &baked)?;
        }
    }
    Ok(())
}

async fn run_tile(args: TileArgs) -> Result<()> {
    let source = read_image_file(&args.input)?;
    let mut params = TileParameters::default();
    params.set_crop_percent(args.crop)?;
    params.set_repeat_mode(args.repeat_mode);
    args.color.apply(&mut params)?;

    let compositor = TileCompositor::new(args.quality);
    let tile = compositor.composite_source(&source, &params).await?;
    let chain = FilterChain::for_parameters(&params);
    let output = if chain.is_identity() {
        tile.image().clone()
    } else {
        encode_jpeg(&bake_filter_chain(tile.pixels(), &chain), compositor.quality())?
    };
    write_data_uri(&args.out, &output)?;
    println!(
        "{}",
        json!({
            "out": args.out.display().to_string(),
            "width": tile.width(),
            "height": tile.height(),
            "filter": chain.to_css(),
        })
    );
    Ok(())
}

async fn run_sanitize(args: SanitizeArgs) -> Result<()> {
    let gateway = InferenceGateway::new(GatewayConfig::from_env())?;
    let mut filtered = gateway.sanitize(&args.text).await;
    if args.strip_brands {
        filtered = BrandBlacklist.strip(&filtered);
    }
    println!("{filtered}");
    Ok(())
}

fn read_image_file(path: &Path) -> Result<DataUri> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognised image", path.display()))?;
    Ok(DataUri::new(format.to_mime_type(), bytes))
}

fn write_data_uri(path: &Path, image: &DataUri) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, image.bytes()).with_context(|| format!("failed to write {}", path.display()))
}
