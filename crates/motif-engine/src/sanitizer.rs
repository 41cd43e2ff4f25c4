//! Prompt cleanup before any text reaches the image model.
//!
//! The rewriter is best-effort: when it is unconfigured or fails, the caller's
//! text passes through untouched. Cleanup of its output is a pure function so
//! the heuristics can be pinned down without a network.

use tracing::{debug, warn};

use crate::providers::RewriteClient;

/// Words stripped from rewriter output wherever they appear as whole words.
pub const TEXT_DENYLIST: [&str; 11] = [
    "text",
    "logo",
    "brand",
    "lettering",
    "typography",
    "words",
    "numbers",
    "letters",
    "font",
    "label",
    "sign",
];

const EXPLANATION_MARKERS: [&str; 3] = ["Since ", "remains", "given text"];
const EXPLANATION_STARTS: [&str; 4] = ["Since ", "As there", "There are no", "the filtered text"];

#[derive(Debug, Clone)]
pub struct PromptSanitizer {
    rewriter: RewriteClient,
}

impl PromptSanitizer {
    pub fn new(rewriter: RewriteClient) -> Self {
        Self { rewriter }
    }

    pub fn is_configured(&self) -> bool {
        self.rewriter.is_configured()
    }

    /// Never fails. Empty input stays empty.
    pub async fn sanitize(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        match self.rewriter.rewrite(text).await {
            Ok(raw) => {
                let cleaned = clean_rewrite(text, &raw);
                debug!(original = %text, rewritten = %cleaned, "prompt sanitized");
                cleaned
            }
            Err(err) => {
                warn!(error = %err, "prompt rewrite unavailable; using prompt as given");
                text.to_string()
            }
        }
    }
}

/// Normalizes raw rewriter output for `original`.
///
/// Falls back to `original` when nothing is left or when the result only
/// differs from it by case.
pub fn clean_rewrite(original: &str, raw: &str) -> String {
    let mut filtered = raw.trim().to_string();

    if let Some(rest) = strip_prefix_ignore_case(&filtered, "filtered:") {
        filtered = rest.trim_start().to_string();
    }

    if EXPLANATION_MARKERS
        .iter()
        .any(|marker| filtered.contains(marker))
    {
        let candidate = match filtered.rsplit_once(':') {
            Some((_, tail)) => tail.trim().to_string(),
            None => text_before_explanation(&filtered).trim().to_string(),
        };
        if !candidate.is_empty() {
            filtered = candidate;
        }
    }

    if !original.ends_with('.') {
        if let Some(stripped) = filtered.strip_suffix('.') {
            filtered = stripped.to_string();
        }
    }

    for word in TEXT_DENYLIST {
        filtered = remove_whole_word(&filtered, word);
    }
    let filtered = collapse_whitespace(&filtered);

    if filtered.is_empty() || filtered.to_lowercase() == original.trim().to_lowercase() {
        return original.to_string();
    }
    filtered
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn text_before_explanation(text: &str) -> &str {
    let cut = EXPLANATION_STARTS
        .iter()
        .filter_map(|start| text.find(start))
        .min()
        .unwrap_or(text.len());
    &text[..cut]
}

/// Removes `word` wherever it is not glued to another ASCII word character.
/// Matching ignores ASCII case.
pub(crate) fn remove_whole_word(text: &str, word: &str) -> String {
    if word.is_empty() {
        return text.to_string();
    }
    let haystack = text.to_ascii_lowercase();
    let needle = word.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut kept_until = 0;
    let mut search_from = 0;
    while let Some(found) = haystack[search_from..].find(&needle) {
        let start = search_from + found;
        let end = start + needle.len();
        let open_before = text[..start]
            .chars()
            .next_back()
            .map_or(true, |ch| !is_word_char(ch));
        let open_after = text[end..].chars().next().map_or(true, |ch| !is_word_char(ch));
        if open_before && open_after {
            out.push_str(&text[kept_until..start]);
            kept_until = end;
            search_from = end;
        } else {
            search_from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
    }
    out.push_str(&text[kept_until..]);
    out
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fixed list of brand, franchise and trademark terms removed from generation
/// prompts in addition to the rewriter.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrandBlacklist;

impl BrandBlacklist {
    pub fn terms(&self) -> &'static [&'static str] {
        BRAND_TERMS
    }

    /// Case of the surviving text is kept on purpose; the prompt is not
    /// lowercased before matching. Returns `text` unchanged when stripping
    /// would leave nothing.
    pub fn strip(&self, text: &str) -> String {
        let mut stripped = text.to_string();
        for term in BRAND_TERMS {
            stripped = remove_whole_word(&stripped, term);
        }
        let stripped = collapse_whitespace(&stripped);
        if stripped.is_empty() {
            return text.to_string();
        }
        stripped
    }
}

const BRAND_TERMS: &[&str] = &[
    // text and typography
    "text", "logo", "brand", "label", "sign", "poster", "banner", "typography", "lettering",
    "words", "writing", "letters", "font", "slogan", "title", "caption", "headline", "tagline",
    "quote", "stamp", "watermark", "signature", "emblem", "badge", "symbol",
    // print and media
    "magazine", "newspaper", "book", "card", "ticket", "certificate", "advertisement", "ad",
    "flyer", "brochure", "packaging", "wrapper", "menu", "invoice", "receipt", "document", "page",
    "billboard",
    // car manufacturers
    "toyota", "ford", "chevrolet", "chevy", "honda", "nissan", "hyundai", "mercedes", "bmw",
    "audi", "volkswagen", "vw", "porsche", "ferrari", "lamborghini", "tesla", "mazda", "subaru",
    "lexus", "infiniti", "cadillac", "dodge", "jeep", "ram", "chrysler", "buick", "gmc", "volvo",
    "jaguar", "landrover", "bentley", "rollsroyce", "maserati", "bugatti", "mclaren", "aston",
    "lotus", "fiat", "alfa", "peugeot", "renault", "citroen", "mini", "seat", "skoda",
    "mitsubishi", "kia",
    // tech brands
    "apple", "microsoft", "google", "amazon", "facebook", "meta", "twitter", "samsung", "sony",
    "lg", "dell", "hp", "lenovo", "asus", "acer", "intel", "amd", "nvidia", "ibm", "oracle",
    "adobe", "netflix", "spotify", "youtube", "instagram", "tiktok", "snapchat", "linkedin",
    // fashion and retail
    "nike", "adidas", "puma", "reebok", "underarmour", "vans", "converse", "gucci", "prada",
    "chanel", "dior", "versace", "armani", "burberry", "hermès", "louisvuitton", "fendi",
    "givenchy", "balenciaga", "valentino", "zara", "h&m", "gap", "uniqlo", "forever21", "target",
    "walmart",
    // food and beverage
    "cocacola", "coke", "pepsi", "sprite", "fanta", "redbull", "monster", "starbucks", "mcdonalds",
    "burgerking", "subway", "kfc", "pizzahut", "dominos", "wendys", "tacobell", "chipotle",
    "panera", "dunkin", "nestle", "heinz", "kraft", "kellogs", "generalmills", "nabisco",
    // universities
    "harvard", "yale", "princeton", "stanford", "mit", "cambridge", "oxford", "berkeley", "ucla",
    "usc", "columbia", "cornell", "dartmouth", "penn", "duke", "northwestern", "chicago",
    "caltech", "jhu", "brown",
    // sports teams/brands
    "yankees", "lakers", "patriots", "cowboys", "redsox", "cubs", "dodgers", "knicks", "celtics",
    "warriors", "bulls", "packers", "eagles", "steelers", "nfl", "nba", "mlb", "nhl", "fifa",
    "olympics", "espn",
    // other major brands
    "disney", "warner", "universal", "paramount", "pixar", "dreamworks", "visa", "mastercard",
    "amex", "paypal", "fedex", "ups", "dhl", "ikea", "lego", "barbie", "hasbro", "mattel",
    "nintendo", "playstation", "xbox", "sega", "atari", "monopoly", "scrabble",
    // generic branded items
    "branded", "commercial", "corporate", "company", "business", "trademark", "registered",
    "official", "licensed", "authentic", "original",
];

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use reqwest::Client as HttpClient;
    use serde_json::{json, Value};

    use super::*;
    use crate::config::GatewayConfig;
    use crate::test_support::{spawn_upstream, test_config};

    #[test]
    fn strips_filtered_prefix_and_trailing_period() {
        assert_eq!(
            clean_rewrite("BMW logo on silk", "Filtered: abstract luxury car on silk."),
            "abstract luxury car on silk"
        );
        assert_eq!(
            clean_rewrite("vintage roses.", "FILTERED:vintage roses, faded."),
            "vintage roses, faded."
        );
    }

    #[test]
    fn explanation_keeps_text_after_last_colon() {
        let raw = "Since the input has no brand names, the text remains: dark academia plaid";
        assert_eq!(clean_rewrite("Dark academia plaid!", raw), "dark academia plaid");
    }

    #[test]
    fn words_starting_with_since_are_not_explanations() {
        assert_eq!(
            clean_rewrite("roses", "Sincerely vintage: abstract roses"),
            "Sincerely vintage: abstract roses"
        );
    }

    #[test]
    fn explanation_without_colon_keeps_leading_text() {
        let raw = "grunge roses Since there were no brands to replace";
        assert_eq!(clean_rewrite("grunge roses with a logo", raw), "grunge roses");
    }

    #[test]
    fn denylisted_words_are_removed_as_whole_words_only() {
        assert_eq!(
            clean_rewrite("x", "paisley with text and lettering, signature textures"),
            "paisley with and , signature textures"
        );
        assert_eq!(clean_rewrite("x", "Logo FONT tiles"), "tiles");
    }

    #[test]
    fn case_only_change_returns_original() {
        assert_eq!(clean_rewrite("Ditsy Floral", "ditsy floral"), "Ditsy Floral");
    }

    #[test]
    fn empty_result_returns_original() {
        assert_eq!(clean_rewrite("logo", "Filtered: logo."), "logo");
        assert_eq!(clean_rewrite("abc", "   "), "abc");
    }

    #[test]
    fn brand_blacklist_keeps_case_of_remaining_words() {
        let blacklist = BrandBlacklist;
        assert_eq!(
            blacklist.strip("Perfectly seamless Gucci pattern inspired by Disney"),
            "Perfectly seamless pattern inspired by"
        );
        assert_eq!(blacklist.strip("H&M stripes"), "stripes");
        assert_eq!(blacklist.strip("gucci"), "gucci");
        assert_eq!(blacklist.strip("nikes rampant"), "nikes rampant");
    }

    #[test]
    fn whole_word_removal_respects_boundaries() {
        assert_eq!(remove_whole_word("sign signs design sign.", "sign"), " signs design .");
        assert_eq!(remove_whole_word("SIGN_off", "sign"), "SIGN_off");
        assert_eq!(remove_whole_word("", "sign"), "");
    }

    fn sanitizer_with(config: &GatewayConfig) -> PromptSanitizer {
        PromptSanitizer::new(RewriteClient::new(HttpClient::new(), config))
    }

    #[tokio::test]
    async fn passes_through_when_rewriter_is_unconfigured() {
        let sanitizer = sanitizer_with(&GatewayConfig::default());
        assert!(!sanitizer.is_configured());
        assert_eq!(sanitizer.sanitize("BMW logo").await, "BMW logo");
        assert_eq!(sanitizer.sanitize("").await, "");
    }

    #[tokio::test]
    async fn passes_through_when_rewriter_fails() {
        let app = Router::new().route(
            "/openai/v1/chat/completions",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_upstream(app).await;
        let sanitizer = sanitizer_with(&test_config(&base));
        assert_eq!(sanitizer.sanitize("BMW logo").await, "BMW logo");
    }

    #[tokio::test]
    async fn cleans_rewriter_output() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/openai/v1/chat/completions",
                post(
                    |State(calls): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
                        let answer = if prompt.ends_with("Text: BMW logo on silk\nFiltered:") {
                            "Filtered: abstract luxury car on silk."
                        } else {
                            "unexpected"
                        };
                        Json(json!({"choices": [{"message": {"content": answer}}]}))
                    },
                ),
            )
            .with_state(calls.clone());
        let base = spawn_upstream(app).await;
        let sanitizer = sanitizer_with(&test_config(&base));

        assert_eq!(
            sanitizer.sanitize("BMW logo on silk").await,
            "abstract luxury car on silk"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
