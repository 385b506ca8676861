//! HTTP side of the dashboard pages: initial filters, option lists and chart data.

use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::cascade::InitialFilters;
use crate::charts::{ChartPayload, Dashboard};
use crate::options::FilterOption;
use crate::selection::{Selection, Slot};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned {0}")]
    Status(StatusCode),

    #[error("Unexpected payload: {0}")]
    Payload(String),
}

/// The dashboard endpoints a page talks to
#[allow(async_fn_in_trait)]
pub trait FilterApi {
    /// `filters?mode=initial`
    async fn initial(&self) -> Result<InitialFilters, ClientError>;

    /// `filters?type=<slot>&<parentKey>=<parent>`
    async fn options(&self, slot: Slot, parent: Option<&str>) -> Result<Vec<FilterOption>, ClientError>;

    async fn chart_data(&self, dashboard: Dashboard, selection: &Selection) -> Result<ChartPayload, ClientError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    data: Value,
}

fn unwrap_envelope<T: DeserializeOwned>(expected: &str, body: Value) -> Result<T, ClientError> {
    let envelope: Envelope =
        serde_json::from_value(body).map_err(|e| ClientError::Payload(e.to_string()))?;
    if envelope.kind != expected {
        return Err(ClientError::Payload(format!(
            "expected type {}, got {}",
            expected, envelope.kind
        )));
    }
    serde_json::from_value(envelope.data).map_err(|e| ClientError::Payload(e.to_string()))
}

/// Decode an option-list response, checking it answers `slot`
pub fn parse_options(slot: Slot, body: Value) -> Result<Vec<FilterOption>, ClientError> {
    unwrap_envelope(slot.as_str(), body)
}

pub fn parse_initial(body: Value) -> Result<InitialFilters, ClientError> {
    unwrap_envelope("initial", body)
}

/// Path and query of an option-list request
pub fn options_path(slot: Slot, parent: Option<&str>) -> String {
    let mut path = format!("/api/dashboard/filters?type={}", slot);
    if let (Some(key), Some(code)) = (slot.parent_key(), parent) {
        path.push_str(&format!("&{}={}", key, urlencoding::encode(code)));
    }
    path
}

/// [`FilterApi`] over HTTP, keeping the session cookie between calls
pub struct HttpFilterApi {
    client: Client,
    base_url: String,
}

impl HttpFilterApi {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(HttpFilterApi {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Sign in; the session cookie is kept for later requests
    pub async fn login(&self, username: &str, password: &str, fiscal_year: Option<i32>) -> Result<(), ClientError> {
        let year = fiscal_year.map(|y| y.to_string()).unwrap_or_default();
        let form = [
            ("username", username),
            ("password", password),
            ("fiscal_year", year.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/login", self.base_url))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!("GET {}", path);
        let response = self.client.get(format!("{}{}", self.base_url, path)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Payload(e.to_string()))
    }
}

impl FilterApi for HttpFilterApi {
    async fn initial(&self) -> Result<InitialFilters, ClientError> {
        let body: Value = self.get_json("/api/dashboard/filters?mode=initial").await?;
        parse_initial(body)
    }

    async fn options(&self, slot: Slot, parent: Option<&str>) -> Result<Vec<FilterOption>, ClientError> {
        let body: Value = self.get_json(&options_path(slot, parent)).await?;
        parse_options(slot, body)
    }

    async fn chart_data(&self, dashboard: Dashboard, selection: &Selection) -> Result<ChartPayload, ClientError> {
        let path = format!("{}{}", dashboard.path(), selection.query_string());
        self.get_json(&path).await
    }
}
