//! Nightscout REST client
//!
//! Every upload is a single JSON POST authenticated with the SHA-1 hex
//! digest of the API secret. Any transport failure or non-2xx response
//! fails that upload only.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::{NightscoutError, NightscoutResult};
use crate::payload::{BolusTreatment, DeviceStatus, Entry, TempBasalTreatment};

const API_BASE: &str = "/api/v1/";
const USER_AGENT: &str = "dd-guard";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Nightscout API endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Sensor glucose entries
    Entries,
    /// Pump and uploader status
    DeviceStatus,
    /// Boluses, temp basals and other care events
    Treatments,
}

impl Endpoint {
    /// Path relative to the API base
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Entries => "entries.json",
            Endpoint::DeviceStatus => "devicestatus.json",
            Endpoint::Treatments => "treatments",
        }
    }
}

/// Hash an API secret the way Nightscout expects it in the `api-secret` header
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha1::digest(secret.trim().as_bytes()))
}

/// Normalize a configured server into a base URL without trailing slash
pub fn base_url(server: &str) -> NightscoutResult<String> {
    let server = server.trim().trim_end_matches('/');
    if server.is_empty() {
        return Err(NightscoutError::InvalidServer("empty server address".to_string()));
    }
    if server.starts_with("http://") || server.starts_with("https://") {
        Ok(server.to_string())
    } else {
        Ok(format!("http://{}", server))
    }
}

/// Uploader bound to one Nightscout site
#[derive(Debug, Clone)]
pub struct NightscoutClient {
    http: reqwest::Client,
    base_url: String,
}

impl NightscoutClient {
    /// Create a client for `server` authenticated with `secret`
    pub fn new(server: &str, secret: &str) -> NightscoutResult<Self> {
        let base_url = base_url(server)?;

        let mut headers = HeaderMap::new();
        let hashed = HeaderValue::from_str(&hash_secret(secret))
            .map_err(|e| NightscoutError::InvalidServer(e.to_string()))?;
        headers.insert("api-secret", hashed);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Base URL uploads are sent to
    pub fn base(&self) -> &str {
        &self.base_url
    }

    /// Upload a sensor glucose entry
    pub async fn upload_entry(&self, entry: &Entry) -> NightscoutResult<()> {
        self.post(Endpoint::Entries, entry).await
    }

    /// Upload pump status
    pub async fn upload_device_status(&self, status: &DeviceStatus) -> NightscoutResult<()> {
        self.post(Endpoint::DeviceStatus, status).await
    }

    /// Upload a bolus treatment
    pub async fn upload_bolus(&self, bolus: &BolusTreatment) -> NightscoutResult<()> {
        self.post(Endpoint::Treatments, bolus).await
    }

    /// Upload the current basal rate as a temp basal treatment
    pub async fn upload_temp_basal(&self, basal: &TempBasalTreatment) -> NightscoutResult<()> {
        self.post(Endpoint::Treatments, basal).await
    }

    async fn post<T: Serialize>(&self, endpoint: Endpoint, body: &T) -> NightscoutResult<()> {
        let url = format!("{}{}{}", self.base_url, API_BASE, endpoint.path());
        debug!(%url, "Posting Nightscout record");

        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NightscoutError::Status {
                endpoint: endpoint.path(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Direction;
    use mockito::Matcher;
    use serde_json::json;

    const ABC_SHA1: &str = "a9993e364706816aba3e25717850c26c9cd0d89d";

    #[test]
    fn test_secret_hash() {
        assert_eq!(hash_secret("abc"), ABC_SHA1);
        assert_eq!(hash_secret("  abc \n"), ABC_SHA1);
    }

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(base_url("ns.example.org").expect("valid"), "http://ns.example.org");
        assert_eq!(
            base_url(" https://ns.example.org/ ").expect("valid"),
            "https://ns.example.org"
        );
        assert!(base_url("   ").is_err());
    }

    #[tokio::test]
    async fn test_entry_upload_sends_hashed_secret() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/entries.json")
            .match_header("api-secret", ABC_SHA1)
            .match_header("user-agent", "dd-guard")
            .match_body(Matcher::PartialJson(json!({
                "type": "sgv",
                "sgv": 110,
                "direction": "Flat",
                "device": "medtronic-600://NG1"
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = NightscoutClient::new(&server.url(), "abc").expect("client");
        let entry = Entry::sgv("NG1", "2021-01-02T10:15:00Z".to_string(), 1, 110, Direction::Flat);
        client.upload_entry(&entry).await.expect("upload succeeds");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/treatments")
            .with_status(401)
            .create_async()
            .await;

        let client = NightscoutClient::new(&server.url(), "abc").expect("client");
        let bolus = BolusTreatment::correction("NG1", 1, Some(120), 1.5);
        match client.upload_bolus(&bolus).await {
            Err(NightscoutError::Status { endpoint, status }) => {
                assert_eq!(endpoint, "treatments");
                assert_eq!(status, 401);
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_created_status_counts_as_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/treatments")
            .match_body(Matcher::PartialJson(json!({"eventType": "Temp Basal", "duration": 5})))
            .with_status(201)
            .create_async()
            .await;

        let client = NightscoutClient::new(&server.url(), "abc").expect("client");
        let basal = TempBasalTreatment::current_rate("NG1", 1, 0.85);
        client.upload_temp_basal(&basal).await.expect("upload succeeds");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = NightscoutClient::new("http://127.0.0.1:1", "abc").expect("client");
        let entry = Entry::sgv("NG1", "x".to_string(), 1, 100, Direction::Flat);
        assert!(matches!(
            client.upload_entry(&entry).await,
            Err(NightscoutError::Transport(_))
        ));
    }
}
