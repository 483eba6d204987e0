use crate::error::QrError;
use crate::raster::Attachment;
use std::fmt;

/// API key for the inference service. Never printed, never logged.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Blank or missing keys fail here, before any client exists.
    pub fn resolve(key: Option<&str>) -> Result<Self, QrError> {
        match key.map(str::trim) {
            Some(key) if !key.is_empty() => Ok(Self(key.to_owned())),
            _ => Err(QrError::MissingCredential),
        }
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// One hosted model as reported by the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelInfo {
    /// Identifier without the `models/` prefix.
    pub id: String,
    pub supports_generate: bool,
}

impl ModelInfo {
    pub fn new(name: &str, supports_generate: bool) -> Self {
        Self {
            id: normalize_model_id(name).to_owned(),
            supports_generate,
        }
    }
}

pub fn normalize_model_id(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix("models/").unwrap_or(name)
}

/// A hosted multimodal model that can read text out of an image.
pub trait VisionService {
    fn list_models(&self) -> Result<Vec<ModelInfo>, QrError>;

    /// One blocking request: `prompt` plus `image`, answered with free text.
    fn extract_text(
        &self,
        model: &str,
        prompt: &str,
        image: &Attachment,
    ) -> Result<String, QrError>;
}
