//! Blocking client for the Generative Language REST API.

use crate::error::QrError;
use crate::raster::Attachment;
use crate::service::{normalize_model_id, Credential, ModelInfo, VisionService};
use base64::{engine::general_purpose, Engine as _};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

const GENERATE_METHOD: &str = "generateContent";
const PAGE_SIZE: u32 = 100;
const MAX_PAGES: usize = 20;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: Blob<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<RemoteModel>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl From<RemoteModel> for ModelInfo {
    fn from(model: RemoteModel) -> Self {
        let supports_generate = model
            .supported_generation_methods
            .iter()
            .any(|m| m == GENERATE_METHOD);
        ModelInfo::new(&model.name, supports_generate)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

pub struct GeminiClient {
    http: Client,
    endpoint: String,
    credential: Credential,
}

impl GeminiClient {
    pub fn new(credential: Credential, endpoint: &str, timeout: Duration) -> Result<Self, QrError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QrError::service(None, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            credential,
        })
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, QrError> {
        let response = request
            .header("x-goog-api-key", self.credential.expose())
            .send()
            .map_err(|e| QrError::service(None, e.to_string()))?;

        let status = response.status();
        info!("Inference service answered HTTP {}", status.as_u16());
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        Err(QrError::service(
            Some(status.as_u16()),
            error_message(&body, status.canonical_reason().unwrap_or("request failed")),
        ))
    }

    fn list_page(&self, page_token: Option<&str>) -> Result<ListModelsResponse, QrError> {
        let url = format!("{}/v1beta/models", self.endpoint);
        debug!("GET {url}");

        let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_owned()));
        }

        self.send(self.http.get(&url).query(&query))?
            .json()
            .map_err(|e| QrError::service(None, format!("malformed model list: {e}")))
    }
}

impl VisionService for GeminiClient {
    fn list_models(&self) -> Result<Vec<ModelInfo>, QrError> {
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self.list_page(page_token.as_deref())?;
            models.extend(page.models.into_iter().map(ModelInfo::from));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(models),
            }
        }

        warn!("Model list still paginating after {MAX_PAGES} pages, using what was fetched");
        Ok(models)
    }

    fn extract_text(
        &self,
        model: &str,
        prompt: &str,
        image: &Attachment,
    ) -> Result<String, QrError> {
        let url = format!(
            "{}/v1beta/models/{}:{GENERATE_METHOD}",
            self.endpoint,
            normalize_model_id(model)
        );
        debug!("POST {url} ({} byte {})", image.data.len(), image.mime_type);

        let response: GenerateResponse = self
            .send(self.http.post(&url).json(&generate_request(prompt, image)))?
            .json()
            .map_err(|e| QrError::service(None, format!("malformed model response: {e}")))?;

        let text = collect_text(response);
        debug!("Model returned {} characters", text.len());
        Ok(text)
    }
}

fn generate_request<'a>(prompt: &'a str, image: &'a Attachment) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![RequestContent {
            parts: vec![
                RequestPart::Text { text: prompt },
                RequestPart::InlineData {
                    inline_data: Blob {
                        mime_type: image.mime_type,
                        data: general_purpose::STANDARD.encode(&image.data),
                    },
                },
            ],
        }],
    }
}

/// Text parts of the first candidate, concatenated. Blocked or empty answers yield "".
fn collect_text(response: GenerateResponse) -> String {
    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            warn!("Request was blocked by the service: {reason}");
        }
        return String::new();
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            warn!("Model stopped early: {reason}");
        }
    }

    candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn error_message(body: &str, fallback: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) if !envelope.error.message.is_empty() => {
                format!("{} ({status})", envelope.error.message)
            }
            Some(status) => status,
            None if !envelope.error.message.is_empty() => envelope.error.message,
            None => fallback.to_owned(),
        },
        Err(_) => fallback.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_prompt_and_inline_image() {
        let image = Attachment {
            mime_type: "image/png",
            data: vec![1, 2, 3],
        };
        let body = serde_json::to_value(generate_request("read it", &image)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "parts": [
                        { "text": "read it" },
                        { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                    ]
                }]
            })
        );
    }

    #[test]
    fn text_parts_are_joined() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "https://exa" }, { "text": "mple.com\n" }]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "totalTokenCount": 12 }
        }))
        .unwrap();
        assert_eq!(collect_text(response), "https://example.com\n");
    }

    #[test]
    fn blocked_prompt_yields_empty_text() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert_eq!(collect_text(response), "");
    }

    #[test]
    fn candidate_without_content_yields_empty_text() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "RECITATION" }]
        }))
        .unwrap();
        assert_eq!(collect_text(response), "");
    }

    #[test]
    fn model_list_marks_generate_support() {
        let page: ListModelsResponse = serde_json::from_value(json!({
            "models": [
                {
                    "name": "models/gemini-1.5-flash",
                    "supportedGenerationMethods": ["generateContent", "countTokens"]
                },
                {
                    "name": "models/text-embedding-004",
                    "supportedGenerationMethods": ["embedContent"]
                }
            ],
            "nextPageToken": "abc"
        }))
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));

        let models: Vec<ModelInfo> = page.models.into_iter().map(ModelInfo::from).collect();
        assert_eq!(
            models,
            vec![
                ModelInfo::new("gemini-1.5-flash", true),
                ModelInfo::new("text-embedding-004", false),
            ]
        );
    }

    #[test]
    fn service_error_body_is_summarised() {
        let body = json!({
            "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
        })
        .to_string();
        assert_eq!(
            error_message(&body, "Bad Request"),
            "API key not valid. (INVALID_ARGUMENT)"
        );
        assert_eq!(error_message("<html>", "Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn unreachable_endpoint_is_a_service_error() {
        let cred = Credential::resolve(Some("key")).unwrap();
        // Port 9 on loopback: nothing listens, the connection is refused.
        let client =
            GeminiClient::new(cred, "http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
        let err = client.list_models().unwrap_err();
        assert!(matches!(err, QrError::ServiceError { status: None, .. }));
    }
}
