use thiserror::Error;

/// Every way a single enhance or reconstruct action can fail.
#[derive(Error, Debug)]
pub enum QrError {
    #[error("The uploaded file is not a readable image: {0}")]
    InvalidImage(String),

    #[error("No API key supplied. Pass --api-key or set GEMINI_API_KEY.")]
    MissingCredential,

    #[error("No image-capable model is available for this API key.")]
    NoCapableModel,

    #[error("{}", service_message(.status, .message))]
    ServiceError { status: Option<u16>, message: String },

    #[error("The model could not read a QR code in this image.")]
    DecodeFailure,

    #[error("Failed to generate a QR code from the decoded text: {0}")]
    EncodeFailure(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn service_message(status: &Option<u16>, message: &str) -> String {
    match *status {
        Some(code @ (401 | 403)) => {
            format!("The inference service rejected the API key (HTTP {code}): {message}")
        }
        Some(404) => format!(
            "The inference service returned HTTP 404; check the model name and endpoint: {message}"
        ),
        Some(code) => format!("The inference service returned HTTP {code}: {message}"),
        None => format!("Could not reach the inference service: {message}"),
    }
}

impl QrError {
    pub fn service(status: Option<u16>, message: impl Into<String>) -> Self {
        QrError::ServiceError {
            status,
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        QrError::Io {
            context: context.into(),
            source,
        }
    }

    /// Process exit status for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            QrError::InvalidImage(_) => 2,
            QrError::MissingCredential => 3,
            QrError::NoCapableModel => 4,
            QrError::ServiceError { .. } => 5,
            QrError::DecodeFailure => 6,
            QrError::EncodeFailure(_) => 7,
            QrError::InvalidSetting(_) => 8,
            QrError::Io { .. } => 9,
        }
    }
}
