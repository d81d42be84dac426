use crate::config::EnvConfig;
use crate::models::{CommandRequest, DagRun};
use crate::storage::{load_token, KeyValueStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

mod search;

pub use search::{PageFetcher, PageQuery, SearchEndpoint};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No response at all (DNS, CORS, connection reset, ...).
    #[error("network error: {0}")]
    Network(String),
    #[error("Unauthorized")]
    Unauthorized { detail: Option<String> },
    /// Backend answered with an error status.
    #[error("request failed ({status}): {body}")]
    Http {
        status: u16,
        detail: Option<String>,
        body: String,
    },
    #[error("invalid response: {0}")]
    Parse(String),
}

impl ApiError {
    fn network(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        Self::Parse(e.to_string())
    }

    pub(crate) fn from_status(status: u16, body: String) -> Self {
        let detail = detail_from_body(&body);
        if status == 401 {
            Self::Unauthorized { detail }
        } else {
            Self::Http {
                status,
                detail,
                body,
            }
        }
    }

    /// The backend's `detail` field, when the error carried one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { detail } | Self::Http { detail, .. } => detail.as_deref(),
            Self::Network(_) | Self::Parse(_) => None,
        }
    }

    /// Text shown to the user: the backend detail verbatim, else the error itself.
    pub fn user_message(&self) -> String {
        self.detail()
            .map(str::to_string)
            .unwrap_or_else(|| self.to_string())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Http { status, .. } => Some(*status),
            Self::Network(_) | Self::Parse(_) => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Extract `detail` from an error envelope. Non-string details (validation lists) are
/// rendered as JSON.
pub fn detail_from_value(payload: &serde_json::Value) -> Option<String> {
    match payload.get("detail") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn detail_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| detail_from_value(&v))
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            http: reqwest::Client::new(),
        }
    }

    /// Base URL from `window.ENV`, token from the credential store.
    pub fn load_from_storage(store: &dyn KeyValueStore) -> Self {
        let mut client = Self::new(EnvConfig::new().api_url);
        client.token = load_token(store);
        client
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn clear_token(&mut self) {
        self.token = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn get_auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    /// Headers for one request: caller overrides win, content type defaults to JSON.
    pub(crate) fn headers_for(&self, overrides: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = Vec::with_capacity(overrides.len() + 2);
        if let Some(auth) = self.get_auth_header() {
            headers.push(("Authorization".to_string(), auth));
        }
        if !overrides
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        for (k, v) in overrides {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(k));
            headers.push((k.to_string(), v.to_string()));
        }
        headers
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Issue one call. Errors are never swallowed here.
    pub async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&B>,
        headers: &[(&str, &str)],
    ) -> ApiResult<T> {
        let mut req = self.http.request(method.clone(), self.url(path));
        for (k, v) in self.headers_for(headers) {
            req = req.header(k, v);
        }
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(b) = body {
            let bytes = serde_json::to_vec(b).map_err(ApiError::parse)?;
            req = req.body(bytes);
        }

        tracing::debug!(%method, path, "api request");
        let res = req.send().await.map_err(ApiError::network)?;
        let status = res.status();
        let text = res.text().await.map_err(ApiError::network)?;

        if status.is_success() {
            // Empty bodies decode as `null`, which covers `()` responses.
            let body = if text.trim().is_empty() {
                "null"
            } else {
                text.as_str()
            };
            serde_json::from_str(body).map_err(ApiError::parse)
        } else {
            Err(ApiError::from_status(status.as_u16(), text))
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> ApiResult<T> {
        self.request::<T, ()>(reqwest::Method::GET, path, params, None, &[])
            .await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.request(reqwest::Method::POST, path, &[], Some(body), &[])
            .await
    }

    pub async fn get_dag_run(&self, dag_id: &str, dag_run_id: &str) -> ApiResult<DagRun> {
        self.get(
            &format!(
                "/api/v1/task/cmd/dag-run/{}/{}",
                urlencoding::encode(dag_id),
                urlencoding::encode(dag_run_id)
            ),
            &[],
        )
        .await
    }

    pub async fn trigger_dag_run(&self, dag_id: &str, req: &CommandRequest) -> ApiResult<DagRun> {
        self.post(
            &format!("/api/v1/task/cmd/run/{}", urlencoding::encode(dag_id)),
            req,
        )
        .await
    }
}
