use crate::error::QrError;
use crate::service::{normalize_model_id, ModelInfo, VisionService};
use log::{info, warn};

/// Tried in order when no usable model was requested.
pub const PREFERRED_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

/// Models that accept an image alongside the prompt.
pub fn is_capable(model: &ModelInfo) -> bool {
    model.supports_generate && model.id.starts_with("gemini") && !model.id.contains("embedding")
}

pub fn capable_models(models: &[ModelInfo]) -> Vec<&ModelInfo> {
    models.iter().filter(|m| is_capable(m)).collect()
}

/// Pick the model for one reconstruction: the requested one if the service offers it,
/// else the first preferred model on offer, else the first capable model listed.
pub fn select_model(requested: Option<&str>, models: &[ModelInfo]) -> Result<String, QrError> {
    let capable = capable_models(models);

    if let Some(requested) = requested.map(normalize_model_id).filter(|r| !r.is_empty()) {
        if capable.iter().any(|m| m.id == requested) {
            info!("Using requested model {requested}");
            return Ok(requested.to_owned());
        }
        warn!("Requested model {requested} is not available, falling back");
    }

    let chosen = PREFERRED_MODELS
        .iter()
        .find_map(|preferred| capable.iter().find(|m| m.id == *preferred))
        .or_else(|| capable.first())
        .ok_or(QrError::NoCapableModel)?;

    info!("Selected model {}", chosen.id);
    Ok(chosen.id.clone())
}

/// One line per capable model, the one `select_model` would pick marked with `*`.
pub fn model_listing<S: VisionService>(service: &S) -> Result<Vec<String>, QrError> {
    let models = service.list_models()?;
    let selected = select_model(None, &models)?;

    Ok(capable_models(&models)
        .into_iter()
        .map(|model| {
            let marker = if model.id == selected { "*" } else { " " };
            format!("{marker} {}", model.id)
        })
        .collect())
}
