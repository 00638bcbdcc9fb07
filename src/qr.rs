//! QR content building and rendering.
//!
//! The engine never rasterizes anything itself: `BarcodeEncoder` is a
//! black-box seam for whatever 2D-barcode library the surrounding app
//! links. This module decides the *content* — a join-form URL carrying the
//! code string and a discriminator for which flow it belongs to — and wraps
//! the encoder output as a `data:` URI for direct embedding in a page.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use url::Url;

use crate::models::CredentialKind;

pub const DEFAULT_QR_SIZE: u32 = 250;

/// Black-box `encode(content) -> image bytes` (PNG).
pub trait BarcodeEncoder: Send + Sync {
    fn encode(&self, content: &str, width: u32, height: u32) -> anyhow::Result<Vec<u8>>;
}

/// Content a scanner should see for a given credential.
///
/// Attendance and join codes point at the frontend join form with the
/// query parameter names the form expects; personal tokens are scanned by
/// the app itself and carry the bare token.
pub fn qr_content(frontend_base: &Url, kind: CredentialKind, code: &str) -> String {
    let (param, flow) = match kind {
        CredentialKind::Attendance => ("attendanceCode", "attendance"),
        CredentialKind::Join => ("joinCode", "class"),
        CredentialKind::Personal => return code.to_string(),
    };
    let mut url = frontend_base.clone();
    url.set_path("/join-form");
    url.query_pairs_mut()
        .append_pair(param, code)
        .append_pair("type", flow);
    url.to_string()
}

/// Render `content` through the encoder and return a
/// `data:image/png;base64,...` URI.
pub fn render_data_uri(
    encoder: &dyn BarcodeEncoder,
    content: &str,
    size: u32,
) -> anyhow::Result<String> {
    let bytes = encoder.encode(content, size, size)?;
    Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
}
