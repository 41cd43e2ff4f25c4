use std::io::Cursor;
use std::time::Duration;

use axum::Router;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgba, RgbaImage};
use motif_contracts::DataUri;
use tokio::net::TcpListener;

use crate::config::{GatewayConfig, PollPolicy, RateLimitPolicy};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub(crate) async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Config with every credential set and every collaborator pointed at `base`.
pub(crate) fn test_config(base: &str) -> GatewayConfig {
    GatewayConfig {
        prodia_api_key: Some("test-prodia".to_string()),
        replicate_api_token: Some("test-replicate".to_string()),
        groq_api_key: Some("test-groq".to_string()),
        prodia_api_base: format!("{base}/v2"),
        replicate_api_base: format!("{base}/v1"),
        groq_api_base: format!("{base}/openai/v1"),
        request_timeout: Duration::from_secs(10),
        rate_limit: RateLimitPolicy {
            max_retries: 3,
            fallback_base: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
        },
        poll: PollPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        },
        ..GatewayConfig::default()
    }
}

/// Asymmetric gradient so flips and crops are observable.
pub(crate) fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = ((x + 2 * y) % 256) as u8;
        Rgba([r, g, b, 255])
    })
}

pub(crate) fn sample_png(width: u32, height: u32) -> DataUri {
    let mut bytes = Vec::new();
    gradient(width, height)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    DataUri::new("image/png", bytes)
}

pub(crate) fn sample_jpeg(width: u32, height: u32) -> DataUri {
    let rgb = image::DynamicImage::ImageRgba8(gradient(width, height)).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&rgb)
        .expect("encode jpeg");
    DataUri::new("image/jpeg", bytes)
}
