//! Gradio space HTTP client implementation

use crate::error::PredictError;
use crate::types::{FileData, RemoteResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Default timeout for info and upload requests (30 seconds)
const DEFAULT_INFO_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for prediction requests (10 minutes)
/// Mesh generation on a shared space can queue for several minutes
const DEFAULT_PREDICT_TIMEOUT: Duration = Duration::from_secs(600);

/// Prediction capability of a hosted space
///
/// The workflow only depends on this trait, so adapters can be driven by
/// the HTTP client below or by an in-memory fake in tests.
#[async_trait]
pub trait PredictClient: Send + Sync {
    /// Identifier of the space (id or URL), used for logging and downloads
    fn space(&self) -> &str;

    /// Call a named endpoint with positional arguments
    async fn predict(&self, endpoint: &str, args: Vec<Value>) -> Result<RemoteResult, PredictError>;

    /// List the named endpoints the space exposes
    async fn endpoints(&self) -> Result<Vec<String>, PredictError>;

    /// Upload a file so it can be passed as a call argument
    async fn upload(&self, data: Vec<u8>, file_name: &str) -> Result<FileData, PredictError>;
}

/// Resolve a space id (`owner/name`) or URL to the base URL of its API
///
/// ```
/// use spacemesh::client::resolve_space_url;
///
/// assert_eq!(
///     resolve_space_url("tencent/Hunyuan3D-2"),
///     "https://tencent-hunyuan3d-2.hf.space"
/// );
/// assert_eq!(resolve_space_url("http://localhost:7860/"), "http://localhost:7860");
/// ```
pub fn resolve_space_url(space: &str) -> String {
    let space = space.trim();
    if space.starts_with("http://") || space.starts_with("https://") {
        return space.trim_end_matches('/').to_string();
    }
    let subdomain: String = space
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '/' | '_' | '.' => '-',
            other => other,
        })
        .collect();
    format!("https://{}.hf.space", subdomain)
}

/// HTTP client for the Gradio `/gradio_api` protocol
///
/// # Example
///
/// ```no_run
/// use spacemesh::client::{GradioClient, PredictClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = GradioClient::new("TencentARC/InstantMesh");
///
///     for endpoint in client.endpoints().await? {
///         println!("{}", endpoint);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GradioClient {
    client: Client,
    space: String,
    base_url: String,
    token: Option<String>,
    info_timeout: Duration,
    predict_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    #[serde(default)]
    named_endpoints: HashMap<String, Value>,
}

impl GradioClient {
    /// Create a client for a space id (`owner/name`) or a full URL
    pub fn new(space: impl Into<String>) -> Self {
        let space = space.into();
        Self {
            client: Client::new(),
            base_url: resolve_space_url(&space),
            space,
            token: None,
            info_timeout: DEFAULT_INFO_TIMEOUT,
            predict_timeout: DEFAULT_PREDICT_TIMEOUT,
        }
    }

    /// Send a bearer token with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Set the timeout for info and upload requests
    pub fn with_info_timeout(mut self, timeout: Duration) -> Self {
        self.info_timeout = timeout;
        self
    }

    /// Set the timeout for prediction requests
    pub fn with_predict_timeout(mut self, timeout: Duration) -> Self {
        self.predict_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL under which the space serves a file it stores at `path`
    pub fn file_url(&self, path: &str) -> String {
        format!("{}/gradio_api/file={}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_send_error(&self, e: reqwest::Error, timeout: Duration) -> PredictError {
        if e.is_timeout() {
            PredictError::TimeoutError(timeout.as_secs())
        } else if e.is_connect() {
            PredictError::ConnectionError(format!("Failed to connect to {}: {}", self.base_url, e))
        } else {
            PredictError::RequestFailed(e)
        }
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, PredictError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        Err(PredictError::ServerError {
            status: status.as_u16(),
            message,
        })
    }

    /// Attach the space's file url to every file payload lacking one
    fn resolve_file_urls(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                let has_url = map.get("url").is_some_and(|u| u.is_string());
                if !has_url {
                    if let Some(path) = map.get("path").and_then(Value::as_str) {
                        let url = self.file_url(path);
                        map.insert("url".to_string(), Value::String(url));
                    }
                }
            }
            Value::Array(items) => items.iter_mut().for_each(|v| self.resolve_file_urls(v)),
            _ => {}
        }
    }
}

#[async_trait]
impl PredictClient for GradioClient {
    fn space(&self) -> &str {
        &self.space
    }

    async fn predict(&self, endpoint: &str, args: Vec<Value>) -> Result<RemoteResult, PredictError> {
        let name = endpoint.trim_start_matches('/');
        let url = format!("{}/gradio_api/call/{}", self.base_url, name);

        tracing::debug!("POST {} ({} args)", url, args.len());
        let response = self
            .authorize(self.client.post(&url))
            .json(&serde_json::json!({ "data": args }))
            .timeout(self.info_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.info_timeout))?;
        let call: CallResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PredictError::ParseError(format!("Failed to parse call response: {}", e)))?;

        let stream_url = format!("{}/{}", url, call.event_id);
        let response = self
            .authorize(self.client.get(&stream_url))
            .timeout(self.predict_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.predict_timeout))?;
        let body = Self::check_status(response)
            .await?
            .text()
            .await
            .map_err(|e| self.map_send_error(e, self.predict_timeout))?;

        let mut slots = parse_event_stream(endpoint, &body)?;
        slots.iter_mut().for_each(|v| self.resolve_file_urls(v));
        Ok(RemoteResult::new(slots))
    }

    async fn endpoints(&self) -> Result<Vec<String>, PredictError> {
        let url = format!("{}/gradio_api/info", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .timeout(self.info_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.info_timeout))?;
        let info: InfoResponse = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PredictError::ParseError(format!("Failed to parse info response: {}", e)))?;

        let mut names: Vec<String> = info.named_endpoints.into_keys().collect();
        names.sort();
        Ok(names)
    }

    async fn upload(&self, data: Vec<u8>, file_name: &str) -> Result<FileData, PredictError> {
        let url = format!("{}/gradio_api/upload", self.base_url);
        let size = data.len() as u64;
        let part = reqwest::multipart::Part::bytes(data).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("files", part);

        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .timeout(self.info_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e, self.info_timeout))?;
        let paths: Vec<String> = Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| PredictError::ParseError(format!("Failed to parse upload response: {}", e)))?;

        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| PredictError::ParseError("Upload returned no paths".to_string()))?;
        Ok(FileData {
            url: Some(self.file_url(&path)),
            path: Some(path),
            orig_name: Some(file_name.to_string()),
            size: Some(size),
            mime_type: None,
        })
    }
}

/// Extract the result of a call from a Gradio event stream body
///
/// The stream is a sequence of `event:` / `data:` pairs. `complete` carries
/// the result array, `error` the failure message; heartbeats and progress
/// events are skipped.
pub(crate) fn parse_event_stream(endpoint: &str, body: &str) -> Result<Vec<Value>, PredictError> {
    let mut event = "";

    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            match event {
                "complete" => {
                    return match serde_json::from_str::<Value>(data) {
                        Ok(Value::Array(slots)) => Ok(slots),
                        Ok(Value::Null) => Ok(Vec::new()),
                        Ok(other) => Ok(vec![other]),
                        Err(e) => Err(PredictError::ParseError(format!(
                            "Invalid result payload from {}: {}",
                            endpoint, e
                        ))),
                    };
                }
                "error" => {
                    let message = match serde_json::from_str::<Value>(data) {
                        Ok(Value::String(s)) => s,
                        Ok(Value::Null) | Err(_) if data.is_empty() || data == "null" => {
                            "space reported an error without details".to_string()
                        }
                        _ => data.to_string(),
                    };
                    return Err(PredictError::RemoteError {
                        endpoint: endpoint.to_string(),
                        message,
                    });
                }
                _ => {}
            }
        }
    }

    Err(PredictError::ParseError(format!(
        "Event stream for {} ended without a result",
        endpoint
    )))
}
