use crate::error::QrError;
use crate::qr::{render_qr, QrStyle};
use crate::raster::{attachment, decode_image};
use crate::service::VisionService;
use image::GrayImage;
use log::info;

/// Returned by the model when it cannot read a code.
pub const UNREADABLE_SENTINEL: &str = "NO_QR_FOUND";

pub const EXTRACT_PROMPT: &str = "This image contains a QR code. \
Reply with only the exact text or URL encoded in it, with no explanation, \
quotes or formatting. If the QR code cannot be read, reply with exactly NO_QR_FOUND.";

/// A freshly generated symbol and the payload it encodes.
#[derive(Debug)]
pub struct Reconstruction {
    pub model: String,
    pub text: String,
    pub image: GrayImage,
}

pub struct Reconstructor<'a, S: VisionService> {
    service: &'a S,
    style: QrStyle,
}

impl<'a, S: VisionService> Reconstructor<'a, S> {
    pub fn new(service: &'a S, style: QrStyle) -> Self {
        Self { service, style }
    }

    /// Read the payload from the upload with `model`, then encode it as a new symbol.
    pub fn reconstruct(&self, upload: &[u8], model: &str) -> Result<Reconstruction, QrError> {
        let decoded = decode_image(upload)?;
        let image = attachment(upload, &decoded)?;

        info!("Asking {model} to read a {}x{} image", decoded.width(), decoded.height());
        let reply = self.service.extract_text(model, EXTRACT_PROMPT, &image)?;
        let text = parse_reply(&reply)?;

        let image = render_qr(&text, &self.style)?;
        info!("Regenerated a {}x{} symbol", image.width(), image.height());

        Ok(Reconstruction {
            model: model.to_owned(),
            text,
            image,
        })
    }
}

/// Trimmed reply, or `DecodeFailure` when it is empty or the sentinel.
/// The sentinel still counts when wrapped in quotes, backticks or trailing punctuation.
pub fn parse_reply(reply: &str) -> Result<String, QrError> {
    let text = reply.trim();
    let bare = text.trim_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    if text.is_empty() || bare.eq_ignore_ascii_case(UNREADABLE_SENTINEL) {
        return Err(QrError::DecodeFailure);
    }
    Ok(text.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{encode_png, Attachment};
    use crate::service::ModelInfo;
    use image::{ImageBuffer, Luma};
    use std::cell::RefCell;

    struct FakeService {
        reply: Result<String, u16>,
        calls: RefCell<Vec<(String, String, &'static str)>>,
    }

    impl FakeService {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_owned()),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl VisionService for FakeService {
        fn list_models(&self) -> Result<Vec<ModelInfo>, QrError> {
            Ok(vec![ModelInfo::new("gemini-1.5-flash", true)])
        }

        fn extract_text(
            &self,
            model: &str,
            prompt: &str,
            image: &Attachment,
        ) -> Result<String, QrError> {
            self.calls
                .borrow_mut()
                .push((model.to_owned(), prompt.to_owned(), image.mime_type));
            self.reply
                .clone()
                .map_err(|status| QrError::service(Some(status), "boom"))
        }
    }

    fn upload() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(30, 30, |x, y| Luma([((x + y) * 4) as u8]));
        encode_png(&img).unwrap()
    }

    fn decode_symbol(img: &GrayImage) -> String {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
            img.get_pixel(x as u32, y as u32)[0]
        });
        let grids = prepared.detect_grids();
        grids[0].decode().unwrap().1
    }

    #[test]
    fn decoded_url_is_regenerated() {
        let service = FakeService::replying("  https://example.com\n");
        let result = Reconstructor::new(&service, QrStyle::default())
            .reconstruct(&upload(), "gemini-1.5-flash")
            .unwrap();

        assert_eq!(result.text, "https://example.com");
        assert_eq!(result.model, "gemini-1.5-flash");
        assert_eq!(decode_symbol(&result.image), "https://example.com");

        let calls = service.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "gemini-1.5-flash");
        assert_eq!(calls[0].1, EXTRACT_PROMPT);
        assert_eq!(calls[0].2, "image/png");
    }

    #[test]
    fn empty_and_sentinel_replies_are_decode_failures() {
        for reply in ["", "   \n", "NO_QR_FOUND", " no_qr_found "] {
            let service = FakeService::replying(reply);
            let result = Reconstructor::new(&service, QrStyle::default())
                .reconstruct(&upload(), "gemini-1.5-flash");
            assert!(matches!(result, Err(QrError::DecodeFailure)), "{reply:?}");
        }
    }

    #[test]
    fn service_errors_pass_through() {
        let service = FakeService::failing(403);
        let result = Reconstructor::new(&service, QrStyle::default())
            .reconstruct(&upload(), "gemini-1.5-flash");
        assert!(matches!(
            result,
            Err(QrError::ServiceError {
                status: Some(403),
                ..
            })
        ));
    }

    #[test]
    fn invalid_upload_never_reaches_the_service() {
        let service = FakeService::replying("https://example.com");
        let result =
            Reconstructor::new(&service, QrStyle::default()).reconstruct(b"not an image", "m");
        assert!(matches!(result, Err(QrError::InvalidImage(_))));
        assert!(service.calls.borrow().is_empty());
    }

    #[test]
    fn unencodable_text_is_an_encode_failure() {
        let service = FakeService::replying(&"z".repeat(8000));
        let result = Reconstructor::new(&service, QrStyle::default())
            .reconstruct(&upload(), "gemini-1.5-flash");
        assert!(matches!(result, Err(QrError::EncodeFailure(_))));
    }

    #[test]
    fn decorated_sentinel_is_still_a_decode_failure() {
        for reply in [
            "NO_QR_FOUND.",
            "`NO_QR_FOUND`",
            "\"NO_QR_FOUND\"",
            "```\nNO_QR_FOUND\n```",
            "'no_qr_found'!",
        ] {
            assert!(
                matches!(parse_reply(reply), Err(QrError::DecodeFailure)),
                "{reply:?}"
            );
        }
        // Punctuation is part of a real payload and is kept.
        assert_eq!(parse_reply("\"hello.\"").unwrap(), "\"hello.\"");
    }

    #[test]
    fn reply_parsing_keeps_inner_whitespace() {
        assert_eq!(parse_reply("\tWIFI:S:my net;;\n").unwrap(), "WIFI:S:my net;;");
        assert!(matches!(parse_reply(""), Err(QrError::DecodeFailure)));
    }
}
