//! HTTP client for the Vitec Next document-template endpoints.
//!
//! Every endpoint is a POST with a small JSON body, authenticated by the
//! browser session cookie plus the XSRF token echoed in a header.

use std::time::Duration;

use async_trait::async_trait;
use nextport_core::{TemplateContent, TemplateSummary};
use reqwest::header::COOKIE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::{SessionAuth, SyncError, TemplateApi};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Endpoint paths, relative to the base URL.
///
/// The save path has never been confirmed against vendor documentation, so
/// all four can be overridden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub list: String,
    pub details: String,
    pub content: String,
    pub save: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            list: "/api/DocumentTemplate/GetDocumentTemplates".into(),
            details: "/api/DocumentTemplate/GetDocumentTemplate".into(),
            content: "/api/DocumentTemplate/GetDocumentTemplateContent".into(),
            save: "/api/DocumentTemplate/SaveDocumentTemplateContent".into(),
        }
    }
}

/// The list endpoint answers either with a bare array or wrapped in `items`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Bare(Vec<TemplateSummary>),
    Wrapped { items: Vec<TemplateSummary> },
}

impl ListResponse {
    fn into_inner(self) -> Vec<TemplateSummary> {
        match self {
            Self::Bare(items) | Self::Wrapped { items } => items,
        }
    }
}

/// HTTP implementation of [`TemplateApi`].
pub struct VendorClient {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
    auth: SessionAuth,
}

impl VendorClient {
    /// Create a client for the given vendor base URL.
    ///
    /// `base_url` should be like `https://next.vitecnext.no` (a trailing
    /// slash is dropped).
    pub fn new(base_url: &str, auth: SessionAuth, endpoints: Endpoints) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url, auth, endpoints))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        auth: SessionAuth,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` and return the raw response text.
    async fn post(&self, path: &str, body: &Value) -> Result<String, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        let resp = self
            .client
            .post(&url)
            .header(COOKIE, self.auth.cookie_header())
            .header(self.auth.token_header(), self.auth.token())
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.text().await?)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, SyncError> {
        let text = self.post(path, body).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl TemplateApi for VendorClient {
    async fn list_templates(&self) -> Result<Vec<TemplateSummary>, SyncError> {
        info!(base_url = %self.base_url, "listing templates");
        let list: ListResponse = self.post_json(&self.endpoints.list, &json!({})).await?;
        let templates = list.into_inner();
        info!(count = templates.len(), "listed templates");
        Ok(templates)
    }

    async fn fetch_details(&self, id: &str) -> Result<Value, SyncError> {
        let details: Value = self
            .post_json(&self.endpoints.details, &json!({ "documentTemplateId": id }))
            .await?;
        if !details.is_object() {
            return Err(SyncError::Unexpected(format!(
                "details for {id} is not a JSON object"
            )));
        }
        Ok(details)
    }

    async fn fetch_content(&self, id: &str) -> Result<TemplateContent, SyncError> {
        self.post_json(&self.endpoints.content, &json!({ "documentTemplateId": id }))
            .await
    }

    async fn save_content(&self, id: &str, html: &str) -> Result<(), SyncError> {
        info!(id, bytes = html.len(), "saving template content");
        self.post(
            &self.endpoints.save,
            &json!({ "documentTemplateId": id, "content": html }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{DEFAULT_TOKEN_COOKIE, DEFAULT_TOKEN_HEADER};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn auth() -> SessionAuth {
        SessionAuth::from_cookie_header(
            "sid=s1; XSRF-TOKEN=tok123",
            DEFAULT_TOKEN_COOKIE,
            DEFAULT_TOKEN_HEADER,
        )
        .unwrap()
    }

    fn client(base_url: &str) -> VendorClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        VendorClient::with_client(http, base_url, auth(), Endpoints::default())
    }

    /// Serve a single canned response; the handle yields the raw request.
    async fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_request(&mut sock).await;
            let resp = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(resp.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
            request
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(sock: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= pos + 4 + len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn client_trims_trailing_slash() {
        let c = client("https://next.example.no/");
        assert_eq!(c.base_url(), "https://next.example.no");
    }

    #[test]
    fn list_response_accepts_both_shapes() {
        let bare: ListResponse = serde_json::from_str(r#"[{"id": "1"}, {"id": 2}]"#).unwrap();
        assert_eq!(bare.into_inner().len(), 2);
        let wrapped: ListResponse =
            serde_json::from_str(r#"{"items": [{"documentTemplateId": "3", "name": "X"}]}"#)
                .unwrap();
        let items = wrapped.into_inner();
        assert_eq!(items[0].id, "3");
        assert_eq!(items[0].title, "X");
    }

    #[tokio::test]
    async fn content_request_carries_auth_and_id() {
        let (url, handle) = serve_once(200, r#"{"content": "<p>[[a.b]]</p>"}"#).await;
        let content = client(&url).fetch_content("42").await.unwrap();
        assert_eq!(content.content, "<p>[[a.b]]</p>");

        let request = handle.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /api/DocumentTemplate/GetDocumentTemplateContent "));
        assert!(lower.contains("x-xsrf-token: tok123"));
        assert!(lower.contains("cookie: sid=s1; xsrf-token=tok123"));
        assert!(request.contains(r#"{"documentTemplateId":"42"}"#));
    }

    #[tokio::test]
    async fn non_success_status_is_server_error() {
        let (url, _handle) = serve_once(500, r#"{"message": "boom"}"#).await;
        let err = client(&url).fetch_details("1").await.unwrap_err();
        match err {
            SyncError::Server { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn html_login_page_is_json_error() {
        let (url, _handle) = serve_once(200, "<html>login</html>").await;
        let err = client(&url).fetch_content("1").await.unwrap_err();
        assert!(matches!(err, SyncError::Json(_)));
    }

    #[tokio::test]
    async fn details_must_be_an_object() {
        let (url, _handle) = serve_once(200, "[1, 2]").await;
        let err = client(&url).fetch_details("1").await.unwrap_err();
        assert!(matches!(err, SyncError::Unexpected(_)));
    }

    #[tokio::test]
    async fn save_posts_content() {
        let (url, handle) = serve_once(200, "").await;
        client(&url).save_content("7", "<p>new</p>").await.unwrap();
        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/DocumentTemplate/SaveDocumentTemplateContent "));
        assert!(request.contains(r#""content":"<p>new</p>""#));
        assert!(request.contains(r#""documentTemplateId":"7""#));
    }

    #[tokio::test]
    async fn list_unwraps_items() {
        let (url, _handle) =
            serve_once(200, r#"{"items": [{"id": "1", "title": "A", "channel": "sms"}]}"#).await;
        let list = client(&url).list_templates().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].channel, Some(nextport_core::Channel::Sms));
    }
}
