//! Photo payload compression.
//!
//! Uploaded photos arrive as `data:` URLs and are stored inline, so they are
//! scaled down and re-encoded as JPEG before being committed to keep the
//! blob store under its quota. Remote URLs are stored as given.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ImageConfig;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("not a data URL")]
    NotDataUrl,

    #[error("data URL is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// An image URL that has been through the compression phase and is ready to
/// be committed as a memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedPayload {
    pub image_url: String,
    /// False when the original payload was kept (remote URL or decode failure)
    pub compressed: bool,
}

impl PreparedPayload {
    /// Payload stored exactly as uploaded.
    pub fn original(image_url: impl Into<String>) -> Self {
        Self {
            image_url: image_url.into(),
            compressed: false,
        }
    }
}

pub fn is_data_url(url: &str) -> bool {
    url.starts_with("data:")
}

/// Split `data:<mime>;base64,<payload>` into its base64 payload.
fn base64_payload(data_url: &str) -> Result<&str, CodecError> {
    let rest = data_url.strip_prefix("data:").ok_or(CodecError::NotDataUrl)?;
    let (header, payload) = rest.split_once(',').ok_or(CodecError::NotDataUrl)?;
    if !header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
        return Err(CodecError::NotBase64);
    }
    Ok(payload)
}

/// Decode, shrink to at most `max_width` pixels wide (aspect preserved,
/// never enlarged), and re-encode as a JPEG data URL.
pub fn compress(data_url: &str, max_width: u32, quality: u8) -> Result<String, CodecError> {
    let bytes = STANDARD.decode(base64_payload(data_url)?.trim())?;
    let img = image::load_from_memory(&bytes)?;

    let img = if max_width > 0 && img.width() > max_width {
        let height = (u64::from(img.height()) * u64::from(max_width) / u64::from(img.width())).max(1);
        img.resize_exact(max_width, height as u32, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)))?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&out)))
}

/// Compress one upload on a blocking thread.
///
/// Never fails: remote URLs pass through, and a payload that cannot be
/// decoded is kept as uploaded.
pub async fn prepare(image_url: String, config: &ImageConfig) -> PreparedPayload {
    if !is_data_url(&image_url) {
        return PreparedPayload::original(image_url);
    }

    let (max_width, quality) = (config.max_width, config.quality);
    let source = image_url.clone();
    let result = tokio::task::spawn_blocking(move || compress(&source, max_width, quality)).await;

    match result {
        Ok(Ok(compressed)) => {
            tracing::debug!(
                before = image_url.len(),
                after = compressed.len(),
                "Compressed photo payload"
            );
            PreparedPayload {
                image_url: compressed,
                compressed: true,
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Photo compression failed, keeping original payload");
            PreparedPayload::original(image_url)
        }
        Err(e) => {
            tracing::error!(error = %e, "Photo compression task failed");
            PreparedPayload::original(image_url)
        }
    }
}

/// Prepare a batch of uploads with at most `config.concurrency` in flight.
/// Results are returned in input order.
pub async fn prepare_many(images: Vec<String>, config: &ImageConfig) -> Vec<PreparedPayload> {
    let mut results: Vec<PreparedPayload> =
        images.iter().cloned().map(PreparedPayload::original).collect();

    let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, url) in images.into_iter().enumerate() {
        let permits = Arc::clone(&permits);
        let config = config.clone();
        tasks.spawn(async move {
            // Closed only on drop, which cannot happen while tasks hold a clone
            let _permit = permits.acquire_owned().await.ok();
            (index, prepare(url, &config).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, payload)) => results[index] = payload,
            Err(e) => tracing::error!(error = %e, "Photo preparation task failed"),
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn png_data_url(width: u32, height: u32) -> String {
        let img = ImageBuffer::from_pixel(width, height, Rgba([200u8, 120, 40, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(&bytes))
    }

    fn decoded_dimensions(data_url: &str) -> (u32, u32) {
        let bytes = STANDARD.decode(base64_payload(data_url).unwrap()).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        (img.width(), img.height())
    }

    #[test]
    fn test_compress_scales_wide_images() {
        let out = compress(&png_data_url(1600, 400), 800, 70).unwrap();
        assert!(out.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decoded_dimensions(&out), (800, 200));
    }

    #[test]
    fn test_compress_never_enlarges() {
        let out = compress(&png_data_url(120, 90), 800, 70).unwrap();
        assert_eq!(decoded_dimensions(&out), (120, 90));
    }

    #[test]
    fn test_compress_rejects_bad_payloads() {
        assert!(matches!(compress("https://x/y.png", 800, 70), Err(CodecError::NotDataUrl)));
        assert!(matches!(compress("data:text/plain,hello", 800, 70), Err(CodecError::NotBase64)));
        assert!(matches!(
            compress("data:image/png;base64,!!!!", 800, 70),
            Err(CodecError::Base64(_))
        ));
        assert!(matches!(
            compress("data:image/png;base64,aGVsbG8=", 800, 70),
            Err(CodecError::Image(_))
        ));
    }

    #[tokio::test]
    async fn test_prepare_falls_back_to_original() {
        let config = ImageConfig::default();

        let remote = prepare("https://example.com/a.jpg".to_string(), &config).await;
        assert_eq!(remote, PreparedPayload::original("https://example.com/a.jpg"));

        let broken = "data:image/png;base64,aGVsbG8=".to_string();
        let kept = prepare(broken.clone(), &config).await;
        assert_eq!(kept, PreparedPayload::original(broken));
    }

    #[tokio::test]
    async fn test_prepare_many_keeps_input_order() {
        let config = ImageConfig {
            concurrency: 2,
            ..ImageConfig::default()
        };
        let images = vec![
            png_data_url(1000, 500),
            "https://example.com/b.jpg".to_string(),
            png_data_url(300, 300),
        ];

        let prepared = prepare_many(images, &config).await;
        assert_eq!(prepared.len(), 3);
        assert!(prepared[0].compressed);
        assert_eq!(decoded_dimensions(&prepared[0].image_url), (800, 400));
        assert_eq!(prepared[1].image_url, "https://example.com/b.jpg");
        assert!(!prepared[1].compressed);
        assert_eq!(decoded_dimensions(&prepared[2].image_url), (300, 300));
    }
}
