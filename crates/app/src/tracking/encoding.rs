use std::time::Instant;

use anyhow::{Context, Result};
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use video_ingest::Frame;

use super::{annotation, data::Overlay};

/// Encode `frame` as a JPEG, drawing `overlay` first when given.
pub fn render_jpeg(frame: &Frame, overlay: Option<&Overlay>, quality: u8) -> Result<Vec<u8>> {
    let started = Instant::now();
    let mut image = annotation::frame_to_rgb(frame)?;
    if let Some(overlay) = overlay {
        annotation::draw_overlay(&mut image, overlay);
    }
    let jpeg = encode_jpeg(&image, quality)?;
    metrics::histogram!("facecast_encode_seconds").record(started.elapsed().as_secs_f64());
    Ok(jpeg)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .context("JPEG encode failed")?;
    Ok(buffer)
}
