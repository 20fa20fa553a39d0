//! Asset encoding: cropped image file → base64 `ImageData` for a caption call.
//!
//! Assets are already PNG on disk, so the bytes are sent as-is; the format is
//! sniffed only to set the right MIME type. `detail: "high"` keeps small
//! glyphs in equations and table cells legible to the model.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// Read an asset file and wrap it for a multimodal request.
pub async fn encode_asset(path: &Path) -> Result<ImageData, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    encode_bytes(&bytes)
}

/// Encode raw image bytes. Fails if the bytes are not a recognised image format.
pub fn encode_bytes(bytes: &[u8]) -> Result<ImageData, String> {
    let format = image::guess_format(bytes).map_err(|e| format!("not an image: {}", e))?;
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded asset → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, format.to_mime_type()).with_detail("high"))
}
