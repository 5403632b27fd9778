//! Device directory client
//!
//! The directory is the playground backend's view of which devices a user has
//! registered. It answers two questions: which devices exist, and how to open
//! a one-time transport connection to one of them.

use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use rexec_core::prelude::*;
use rexec_core::{AuthTokens, Device, WebSocketEndpointInformation};

/// Device directory operations
///
/// Both the session manager and the headless CLI go through this trait, so
/// tests can substitute an in-memory directory.
#[trait_variant::make(DeviceDirectory: Send)]
pub trait LocalDeviceDirectory {
    /// Fetch every device visible to the authenticated user.
    async fn fetch_devices(&self, tokens: &AuthTokens) -> Result<Vec<Device>>;

    /// Resolve a fresh WebSocket endpoint for `device`.
    ///
    /// Returns `Ok(None)` when the directory declines to hand out an
    /// endpoint (device offline, not owned by the user, ...).
    async fn device_ws_endpoint(
        &self,
        device: &Device,
        tokens: &AuthTokens,
    ) -> Result<Option<WebSocketEndpointInformation>>;
}

impl<T: DeviceDirectory + Sync> DeviceDirectory for std::sync::Arc<T> {
    async fn fetch_devices(&self, tokens: &AuthTokens) -> Result<Vec<Device>> {
        (**self).fetch_devices(tokens).await
    }

    async fn device_ws_endpoint(
        &self,
        device: &Device,
        tokens: &AuthTokens,
    ) -> Result<Option<WebSocketEndpointInformation>> {
        (**self).device_ws_endpoint(device, tokens).await
    }
}

/// HTTP implementation backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpDeviceDirectory {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpDeviceDirectory {
    /// Create a directory client for the backend at `base_url`
    /// (e.g. `https://api.example.org/v2`).
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("Invalid directory URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "Directory URL cannot be used as a base: {base_url}"
            )));
        }
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config("Directory URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn access_token(tokens: &AuthTokens) -> Result<&str> {
        match tokens.access_token.as_deref() {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(Error::Unauthenticated),
        }
    }

    async fn get(&self, url: Url, tokens: &AuthTokens) -> Result<reqwest::Response> {
        let token = Self::access_token(tokens)?;
        debug!("Directory GET {}", url);
        self.client
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::directory(format!("GET {url} failed: {e}")))
    }
}

impl DeviceDirectory for HttpDeviceDirectory {
    async fn fetch_devices(&self, tokens: &AuthTokens) -> Result<Vec<Device>> {
        let url = self.url_for(&["devices"])?;
        let response = self.get(url.clone(), tokens).await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthenticated);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::directory(format!(
                "GET {url} returned {}: {body}",
                status.as_u16()
            )));
        }

        let devices: Vec<Device> = response
            .json()
            .await
            .map_err(|e| Error::directory(format!("Malformed device list: {e}")))?;
        debug!("Directory returned {} device(s)", devices.len());
        Ok(devices)
    }

    async fn device_ws_endpoint(
        &self,
        device: &Device,
        tokens: &AuthTokens,
    ) -> Result<Option<WebSocketEndpointInformation>> {
        let id = device.id.to_string();
        let url = self.url_for(&["devices", id.as_str(), "ws_endpoint"])?;
        let response = self.get(url, tokens).await?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Directory refused endpoint for device {} ({}): {}",
                device.id,
                device.title,
                status.as_u16()
            );
            return Ok(None);
        }

        match response.json::<WebSocketEndpointInformation>().await {
            Ok(endpoint) => Ok(Some(endpoint)),
            Err(e) => {
                warn!("Malformed endpoint for device {}: {}", device.id, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tokens() -> AuthTokens {
        AuthTokens::new("access-1", "refresh-1")
    }

    #[test]
    fn test_url_for_appends_segments_after_base_path() {
        let dir = HttpDeviceDirectory::new("https://api.example.org/v2").unwrap();
        let url = dir.url_for(&["devices", "7", "ws_endpoint"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.org/v2/devices/7/ws_endpoint");

        let dir = HttpDeviceDirectory::new("https://api.example.org/v2/").unwrap();
        let url = dir.url_for(&["devices"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.org/v2/devices");
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        assert!(HttpDeviceDirectory::new("not a url").is_err());
        assert!(HttpDeviceDirectory::new("mailto:someone@example.org").is_err());
    }

    #[tokio::test]
    async fn test_fetch_devices_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1, "title": "EV3 A", "type": "ev3" },
                { "id": 2, "title": "EV3 B", "type": "ev3" }
            ])))
            .mount(&server)
            .await;

        let dir = HttpDeviceDirectory::new(&server.uri()).unwrap();
        let devices = DeviceDirectory::fetch_devices(&dir, &tokens()).await.unwrap();

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0], Device::new(1, "EV3 A", "ev3"));
        assert_eq!(devices[1].title, "EV3 B");
    }

    #[tokio::test]
    async fn test_fetch_devices_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let dir = HttpDeviceDirectory::new(&server.uri()).unwrap();
        let err = DeviceDirectory::fetch_devices(&dir, &tokens()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn test_fetch_devices_server_error_is_directory_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let dir = HttpDeviceDirectory::new(&server.uri()).unwrap();
        let err = DeviceDirectory::fetch_devices(&dir, &tokens()).await.unwrap_err();
        assert!(matches!(err, Error::Directory { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_fetch_devices_without_token_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let dir = HttpDeviceDirectory::new(&server.uri()).unwrap();
        let err = DeviceDirectory::fetch_devices(&dir, &AuthTokens::default()).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn test_device_ws_endpoint_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices/5/ws_endpoint"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "clientNamePrefix": "web-",
                "thingName": "thing-5",
                "endpoint": "wss://broker.example.org/mqtt"
            })))
            .mount(&server)
            .await;

        let dir = HttpDeviceDirectory::new(&server.uri()).unwrap();
        let endpoint = DeviceDirectory::device_ws_endpoint(
            &dir,
            &Device::new(5, "Lab", "ev3"), &tokens())
            .await
            .unwrap()
            .expect("endpoint should resolve");

        assert_eq!(endpoint.client_name_prefix, "web-");
        assert_eq!(endpoint.thing_name, "thing-5");
        assert_eq!(endpoint.endpoint, "wss://broker.example.org/mqtt");
    }

    #[tokio::test]
    async fn test_device_ws_endpoint_refused_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices/9/ws_endpoint"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = HttpDeviceDirectory::new(&server.uri()).unwrap();
        let endpoint = DeviceDirectory::device_ws_endpoint(
            &dir,
            &Device::new(9, "Gone", "ev3"), &tokens())
            .await
            .unwrap();
        assert!(endpoint.is_none());
    }

    #[tokio::test]
    async fn test_device_ws_endpoint_malformed_body_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/devices/3/ws_endpoint"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "endpoint": 1 })),
            )
            .mount(&server)
            .await;

        let dir = HttpDeviceDirectory::new(&server.uri()).unwrap();
        let endpoint = DeviceDirectory::device_ws_endpoint(
            &dir,
            &Device::new(3, "Odd", "ev3"), &tokens())
            .await
            .unwrap();
        assert!(endpoint.is_none());
    }
}
