use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use waypoint_core::{FieldUpdate, SessionCode, SessionFields};

/// HTTP client for the progress and session endpoints.
#[derive(Clone)]
pub struct WaypointClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server refused the input; retrying the same request will not help.
    #[error("rejected: {message}")]
    Rejected { message: String },
    /// The store behind the server failed; worth retrying later.
    #[error("server error: {message}")]
    Backend { message: String },
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Serialize)]
struct ProgressBody<'a> {
    key: &'a str,
    value: &'a Value,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    data: Option<SessionFields>,
    #[serde(default)]
    error: Option<String>,
}

impl WaypointClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn session_url(&self, session: &SessionCode) -> String {
        format!(
            "{}/session/{}",
            self.base_url,
            utf8_percent_encode(session.as_str(), NON_ALPHANUMERIC)
        )
    }

    /// `GET /session/:code`. An unknown session yields empty fields.
    pub async fn fetch_session(&self, session: &SessionCode) -> Result<SessionFields, ClientError> {
        let res = self.http.get(self.session_url(session)).send().await?;
        let envelope = read_envelope(res).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// `POST /session/:code/progress` with a raw key and value.
    pub async fn post_progress(
        &self,
        session: &SessionCode,
        key: &str,
        value: &Value,
    ) -> Result<(), ClientError> {
        let url = format!("{}/progress", self.session_url(session));
        let res = self
            .http
            .post(url)
            .json(&ProgressBody { key, value })
            .send()
            .await?;
        read_envelope(res).await.map(|_| ())
    }

    pub async fn push(&self, update: &FieldUpdate) -> Result<(), ClientError> {
        let (key, value) = update.to_request_parts();
        self.post_progress(update.session(), &key, &value).await
    }
}

async fn read_envelope(res: Response) -> Result<Envelope, ClientError> {
    let status = res.status();
    let body = res.text().await?;
    let envelope = serde_json::from_str::<Envelope>(&body).ok();

    match (status, envelope) {
        (status, Some(envelope)) if status.is_success() && envelope.ok => Ok(envelope),
        (status, envelope) if status == StatusCode::BAD_REQUEST => Err(ClientError::Rejected {
            message: envelope.and_then(|e| e.error).unwrap_or(body),
        }),
        (status, envelope) if status.is_server_error() => Err(ClientError::Backend {
            message: envelope.and_then(|e| e.error).unwrap_or(body),
        }),
        (status, _) if status.is_success() => Err(ClientError::Malformed(body)),
        (status, _) => Err(ClientError::UnexpectedStatus { status, body }),
    }
}
