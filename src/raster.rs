use crate::error::QrError;
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// An image as it will be attached to an inference request.
#[derive(Clone, Debug, PartialEq)]
pub struct Attachment {
    pub mime_type: &'static str,
    pub data: Vec<u8>,
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, QrError> {
    std::fs::read(path).map_err(|e| QrError::io(format!("Failed to read {}", path.display()), e))
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), QrError> {
    std::fs::write(path, bytes)
        .map_err(|e| QrError::io(format!("Failed to write {}", path.display()), e))
}

/// Decode an uploaded file. Empty buffers and zero-sized rasters are rejected.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, QrError> {
    if bytes.is_empty() {
        return Err(QrError::InvalidImage("file is empty".into()));
    }

    let img = image::load_from_memory(bytes).map_err(|e| QrError::InvalidImage(e.to_string()))?;
    if img.width() == 0 || img.height() == 0 {
        return Err(QrError::InvalidImage(format!(
            "image has no pixels ({}x{})",
            img.width(),
            img.height()
        )));
    }

    Ok(img)
}

pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, QrError> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| QrError::EncodeFailure(format!("PNG encoding failed: {e}")))?;
    Ok(buffer.into_inner())
}

/// JPEG and PNG uploads travel as-is; anything else is re-encoded to PNG.
pub fn attachment(bytes: &[u8], decoded: &DynamicImage) -> Result<Attachment, QrError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Ok(Attachment {
            mime_type: "image/jpeg",
            data: bytes.to_vec(),
        }),
        Ok(ImageFormat::Png) => Ok(Attachment {
            mime_type: "image/png",
            data: bytes.to_vec(),
        }),
        _ => {
            let mut buffer = Cursor::new(Vec::new());
            decoded
                .write_to(&mut buffer, ImageFormat::Png)
                .map_err(|e| QrError::InvalidImage(format!("could not re-encode upload: {e}")))?;
            Ok(Attachment {
                mime_type: "image/png",
                data: buffer.into_inner(),
            })
        }
    }
}
