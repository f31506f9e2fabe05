//! HTTP client for the remote inventory service

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{BearerToken, RemoteApi, RemoteCollection, RemoteRecord, RemoteResult};
use crate::config::Config;
use crate::sync::SyncError;

/// Remote client over reqwest
///
/// One instance serves both collections; the per-request timeout applies to
/// every call including the probe.
pub struct HttpRemoteClient {
    base_url: String,
    client: Client,
}

impl HttpRemoteClient {
    /// Create a client for `base_url` (a trailing `/` is ignored)
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a client from the configured URL and timeout
    pub fn from_config(config: &Config) -> RemoteResult<Self> {
        Self::new(&config.api_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    fn record_url(&self, collection: &str, remote_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, remote_id)
    }

    fn action_url(&self, collection: &str, remote_id: Option<&str>, action: &str) -> String {
        match remote_id {
            Some(id) => format!("{}/{}/{}/{}", self.base_url, collection, id, action),
            None => format!("{}/{}/{}", self.base_url, collection, action),
        }
    }

    /// Send a request and decode a JSON body from a success response
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> RemoteResult<T> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Remote call failed with {}: {}", status, body);
            return Err(api_error(status, &body));
        }

        Ok(response.json::<T>().await?)
    }
}

fn api_error(status: StatusCode, body: &str) -> SyncError {
    SyncError::transport(format!("API error: {} - {}", status, body))
}

#[async_trait]
impl RemoteApi for HttpRemoteClient {
    async fn probe(&self) -> bool {
        match self.client.get(format!("{}/", self.base_url)).send().await {
            Ok(response) => {
                debug!("Probe {} answered {}", self.base_url, response.status());
                response.status().is_success()
            }
            Err(e) => {
                debug!("Probe {} failed: {}", self.base_url, e);
                false
            }
        }
    }
}

#[async_trait]
impl<R: RemoteRecord> RemoteCollection<R> for HttpRemoteClient {
    async fn list_all(&self, token: &BearerToken) -> RemoteResult<Vec<R>> {
        let request = self
            .client
            .get(self.collection_url(R::COLLECTION))
            .bearer_auth(token.as_str());
        // A `null` body counts as an empty collection
        let records: Option<Vec<R>> = self.send_json(request).await?;
        Ok(records.unwrap_or_default())
    }

    async fn fetch(&self, token: &BearerToken, remote_id: &str) -> RemoteResult<Option<R>> {
        let response = self
            .client
            .get(self.record_url(R::COLLECTION, remote_id))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        Ok(response.json::<Option<R>>().await?)
    }

    async fn create(&self, token: &BearerToken, payload: &R::Payload) -> RemoteResult<R> {
        let request = self
            .client
            .post(self.action_url(R::COLLECTION, None, "add"))
            .bearer_auth(token.as_str())
            .json(payload);
        self.send_json(request).await
    }

    async fn update(
        &self,
        token: &BearerToken,
        remote_id: &str,
        payload: &R::Payload,
    ) -> RemoteResult<R> {
        let request = self
            .client
            .post(self.action_url(R::COLLECTION, Some(remote_id), "edit"))
            .bearer_auth(token.as_str())
            .json(payload);
        self.send_json(request).await
    }

    async fn delete(&self, token: &BearerToken, remote_id: &str) -> RemoteResult<bool> {
        let response = self
            .client
            .post(self.action_url(R::COLLECTION, Some(remote_id), "delete"))
            .bearer_auth(token.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Remote delete of {} {} refused: {}", R::COLLECTION, remote_id, status);
        }
        Ok(status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ItemPayload, RemoteItem, RemoteLocation};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn client(base_url: &str) -> HttpRemoteClient {
        HttpRemoteClient::new(base_url, Duration::from_secs(5)).unwrap()
    }

    fn token() -> BearerToken {
        BearerToken::new("tok-123").unwrap()
    }

    /// Serve a single canned response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });

        (format!("http://{}", addr), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    #[test]
    fn test_urls() {
        let client = client("http://inventory.local:5000/");
        assert_eq!(client.base_url(), "http://inventory.local:5000");
        assert_eq!(
            client.collection_url("locations"),
            "http://inventory.local:5000/locations"
        );
        assert_eq!(
            client.record_url("items", "abc"),
            "http://inventory.local:5000/items/abc"
        );
        assert_eq!(
            client.action_url("items", None, "add"),
            "http://inventory.local:5000/items/add"
        );
        assert_eq!(
            client.action_url("locations", Some("abc"), "delete"),
            "http://inventory.local:5000/locations/abc/delete"
        );
    }

    #[tokio::test]
    async fn test_probe_unbound_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(!client(&format!("http://{}", addr)).probe().await);
    }

    #[tokio::test]
    async fn test_probe_success_without_auth() {
        let (url, server) = serve_once("200 OK", "{}").await;
        assert!(client(&url).probe().await);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET / "));
        assert!(!request.to_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn test_list_locations_sends_bearer() {
        let (url, server) = serve_once(
            "200 OK",
            r#"[{"_id":"l1","name":"Pantry","description":"","user_id":"u1"}]"#,
        )
        .await;

        let locations = RemoteCollection::<RemoteLocation>::list_all(&client(&url), &token())
            .await
            .unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].id, "l1");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /locations "));
        assert!(request
            .to_lowercase()
            .contains("authorization: bearer tok-123"));
    }

    #[tokio::test]
    async fn test_create_item_posts_payload() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"_id":"i1","name":"Rice","location_id":"l1"}"#,
        )
        .await;

        let payload = ItemPayload {
            name: "Rice".into(),
            brand: String::new(),
            size: String::new(),
            nutritional_info: String::new(),
            date_purchased: String::new(),
            expiration_date: String::new(),
            ingredients: String::new(),
            other_info: String::new(),
            location_id: "l1".into(),
        };
        let created: RemoteItem =
            RemoteCollection::<RemoteItem>::create(&client(&url), &token(), &payload)
                .await
                .unwrap();
        assert_eq!(created.id, "i1");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /items/add "));
        assert!(request.contains(r#""location_id":"l1""#));
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;

        let err = RemoteCollection::<RemoteLocation>::list_all(&client(&url), &token())
            .await
            .unwrap_err();
        match err {
            SyncError::Transport { message } => {
                assert!(message.contains("500"));
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_transport_error() {
        let (url, _server) = serve_once("200 OK", "not json").await;

        let err = RemoteCollection::<RemoteLocation>::list_all(&client(&url), &token())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_none() {
        let (url, server) = serve_once("404 Not Found", "").await;

        let fetched = RemoteCollection::<RemoteItem>::fetch(&client(&url), &token(), "zzz")
            .await
            .unwrap();
        assert!(fetched.is_none());
        assert!(server.await.unwrap().starts_with("GET /items/zzz "));
    }

    #[tokio::test]
    async fn test_delete_refused_is_false() {
        let (url, server) = serve_once("403 Forbidden", "").await;

        let deleted = RemoteCollection::<RemoteLocation>::delete(&client(&url), &token(), "l1")
            .await
            .unwrap();
        assert!(!deleted);
        assert!(server
            .await
            .unwrap()
            .starts_with("POST /locations/l1/delete "));
    }
}
