//! QR payload rendering
//!
//! Produces a data URL a dashboard can drop straight into an `<img>` tag.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use qrcode::render::svg;
use qrcode::QrCode;
use thiserror::Error;

const MIN_DIMENSION: u32 = 256;

#[derive(Debug, Error)]
#[error("QR rendering failed: {0}")]
pub struct QrError(String);

/// Render a QR payload as a base64 SVG data URL
pub fn render_data_url(payload: &str) -> Result<String, QrError> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| QrError(e.to_string()))?;
    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(MIN_DIMENSION, MIN_DIMENSION)
        .quiet_zone(true)
        .build();
    Ok(format!(
        "data:image/svg+xml;base64,{}",
        STANDARD.encode(image.as_bytes())
    ))
}
