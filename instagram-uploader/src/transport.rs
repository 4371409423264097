use async_trait::async_trait;
use crossposter_core::UploadError;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Status code and parsed JSON body of a Graph API call. Bodies that are not
/// JSON are kept as a string value.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphResponse {
    pub status: u16,
    pub body: Value,
}

impl GraphResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `error.message` from a Graph error body, or the raw body.
    pub fn error_message(&self) -> String {
        self.body
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .or_else(|| self.body.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.body.to_string())
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphTransport: Send + Sync {
    async fn get(&self, url: &str, params: Vec<(String, String)>) -> Result<GraphResponse, UploadError>;

    async fn post_form(
        &self,
        url: &str,
        params: Vec<(String, String)>,
    ) -> Result<GraphResponse, UploadError>;

    async fn post_bytes(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Result<GraphResponse, UploadError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(transport_error)?;
        Ok(Self { client })
    }

    async fn finish(response: reqwest::Response) -> Result<GraphResponse, UploadError> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        debug!("Graph API responded {}", status);
        Ok(GraphResponse { status, body })
    }
}

#[async_trait]
impl GraphTransport for ReqwestTransport {
    async fn get(&self, url: &str, params: Vec<(String, String)>) -> Result<GraphResponse, UploadError> {
        let response = self
            .client
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(transport_error)?;
        Self::finish(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        params: Vec<(String, String)>,
    ) -> Result<GraphResponse, UploadError> {
        let response = self
            .client
            .post(url)
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;
        Self::finish(response).await
    }

    async fn post_bytes(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    ) -> Result<GraphResponse, UploadError> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(transport_error)?;
        Self::finish(response).await
    }
}

/// The caller knows which stage failed and fills it in.
fn transport_error(e: reqwest::Error) -> UploadError {
    UploadError::Transport {
        stage: String::new(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_prefers_graph_error() {
        let response = GraphResponse {
            status: 400,
            body: json!({"error": {"message": "Invalid OAuth access token.", "code": 190}}),
        };
        assert!(!response.is_success());
        assert_eq!(response.error_message(), "Invalid OAuth access token.");

        let raw = GraphResponse {
            status: 502,
            body: Value::String("Bad Gateway".to_string()),
        };
        assert_eq!(raw.error_message(), "Bad Gateway");
    }

    #[test]
    fn test_str_field() {
        let response = GraphResponse::ok(json!({"id": "17895695668004550"}));
        assert!(response.is_success());
        assert_eq!(response.str_field("id"), Some("17895695668004550"));
        assert_eq!(response.str_field("missing"), None);
    }
}
