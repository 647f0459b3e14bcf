//! Client for submitting contacts to the LdA logbook.
//!
//! One attempt per record: no retry, no queueing, and no timeout beyond the
//! HTTP client's own defaults.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::qso::{Credentials, NormalizedQso, UploadResult};

/// Default LdA QSO submission endpoint.
pub const LDA_API_URL: &str = "https://www.lda.org.ar/api/qso";

/// Something that can submit a contact to the logbook.
pub trait Uploader: Send + Sync + 'static {
    /// Submit `qso` once and report the outcome.
    fn send(
        &self,
        qso: &NormalizedQso,
        credentials: &Credentials,
    ) -> impl Future<Output = UploadResult> + Send;
}

/// Request body for a QSO submission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QsoSubmission<'a> {
    user: &'a str,
    password: &'a str,
    my_call: &'a str,
    #[serde(flatten)]
    qso: &'a NormalizedQso,
}

/// Response body from the LdA endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LdaResponse {
    success: Option<bool>,
    message: Option<String>,
    error: Option<serde_json::Value>,
}

/// HTTP client for the LdA service.
#[derive(Debug, Clone)]
pub struct LdaClient {
    http: reqwest::Client,
    api_url: String,
}

impl LdaClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn submit(&self, qso: &NormalizedQso, credentials: &Credentials) -> UploadResult {
        let body = QsoSubmission {
            user: &credentials.username,
            password: &credentials.password,
            my_call: &credentials.main_callsign,
            qso,
        };

        debug!("Submitting {} to {}", qso.call, self.api_url);
        let response = match self.http.post(&self.api_url).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("LdA request failed: {}", e);
                return UploadResult::failed(
                    "Could not reach LdA",
                    Some(serde_json::Value::String(e.to_string())),
                );
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return UploadResult::failed(
                    format!("Failed to read LdA response (HTTP {})", status.as_u16()),
                    Some(serde_json::Value::String(e.to_string())),
                );
            }
        };

        interpret_response(status, &text)
    }
}

impl Uploader for LdaClient {
    async fn send(&self, qso: &NormalizedQso, credentials: &Credentials) -> UploadResult {
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return UploadResult::missing_configuration(&missing);
        }

        self.submit(qso, credentials).await.with_data(qso.clone())
    }
}

/// Map an HTTP response to an [`UploadResult`], keeping the body as the
/// diagnostic payload on failure.
fn interpret_response(status: StatusCode, body: &str) -> UploadResult {
    let payload: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let parsed: LdaResponse = payload
        .as_ref()
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let raw_payload = || {
        payload
            .clone()
            .or_else(|| (!body.is_empty()).then(|| serde_json::Value::String(body.to_string())))
    };

    if !status.is_success() {
        return UploadResult::failed(
            parsed
                .message
                .unwrap_or_else(|| format!("LdA rejected the QSO (HTTP {})", status.as_u16())),
            parsed.error.or_else(raw_payload),
        );
    }

    if parsed.success == Some(false) {
        return UploadResult::failed(
            parsed
                .message
                .unwrap_or_else(|| "LdA rejected the QSO".to_string()),
            parsed.error.or_else(raw_payload),
        );
    }

    UploadResult {
        success: true,
        message: parsed
            .message
            .unwrap_or_else(|| "QSO uploaded to LdA".to_string()),
        error: None,
        data: None,
    }
}
