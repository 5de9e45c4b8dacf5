use std::time::Duration;

use async_trait::async_trait;
use log::info;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::config::SheetsConfig;
use crate::services::google_auth::{ServiceAccountAuth, ServiceAccountKey, SPREADSHEETS_SCOPE};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Sheets API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Spreadsheet logging is not available")]
    Unavailable,
}

impl From<reqwest::Error> for SheetsError {
    fn from(error: reqwest::Error) -> Self {
        SheetsError::Http(error.to_string())
    }
}

impl From<serde_json::Error> for SheetsError {
    fn from(error: serde_json::Error) -> Self {
        SheetsError::Http(format!("unexpected response body: {}", error))
    }
}

/// Range reads and writes against one spreadsheet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    /// Confirms the spreadsheet is reachable and returns its title.
    async fn check_spreadsheet(&self) -> Result<String, SheetsError>;
    async fn read_range(&self, range: &str) -> Result<Vec<Vec<Value>>, SheetsError>;
    async fn update_range(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError>;
    async fn append_rows(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError>;
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct SpreadsheetProperties {
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct Spreadsheet {
    properties: SpreadsheetProperties,
}

/// `SheetsBackend` over the Google Sheets v4 REST API, authenticated as a service account.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    base_url: String,
    spreadsheet_id: String,
}

impl GoogleSheetsClient {
    pub fn new(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let key = ServiceAccountKey::from_json(&config.service_account_json)?;
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(GoogleSheetsClient {
            auth: ServiceAccountAuth::new(key, http.clone(), SPREADSHEETS_SCOPE),
            http,
            base_url: config.base_url.clone(),
            spreadsheet_id: config.spreadsheet_id.clone(),
        })
    }

    /// Builds a client and checks that the spreadsheet can be opened.
    pub async fn connect(config: &SheetsConfig) -> Result<Self, SheetsError> {
        let client = Self::new(config)?;
        let title = client.check_spreadsheet().await?;
        info!("Successfully accessed spreadsheet {} ({})", config.spreadsheet_id, title);
        Ok(client)
    }

    fn spreadsheet_url(&self, tail: &[&str]) -> Result<Url, SheetsError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| SheetsError::Http(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Http(format!("cannot build URLs from {}", self.base_url)))?
            .pop_if_empty()
            .push("spreadsheets")
            .push(&self.spreadsheet_id)
            .extend(tail);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, SheetsError> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()))
                .unwrap_or(body);
            return Err(SheetsError::Api { status: status.as_u16(), message });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl SheetsBackend for GoogleSheetsClient {
    async fn check_spreadsheet(&self) -> Result<String, SheetsError> {
        let url = self.spreadsheet_url(&[])?;
        let request = self.http.get(url).query(&[("fields", "properties.title")]);
        let spreadsheet: Spreadsheet = self.send_json(request).await?;
        Ok(spreadsheet.properties.title)
    }

    async fn read_range(&self, range: &str) -> Result<Vec<Vec<Value>>, SheetsError> {
        let url = self.spreadsheet_url(&["values", range])?;
        let values: ValueRange = self.send_json(self.http.get(url)).await?;
        Ok(values.values)
    }

    async fn update_range(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError> {
        let url = self.spreadsheet_url(&["values", range])?;
        let request = self
            .http
            .put(url)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "range": range, "values": rows }));
        let _: Value = self.send_json(request).await?;
        Ok(())
    }

    async fn append_rows(&self, range: &str, rows: Vec<Vec<Value>>) -> Result<(), SheetsError> {
        let url = self.spreadsheet_url(&["values", &format!("{}:append", range)])?;
        let request = self
            .http
            .post(url)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": rows }));
        let _: Value = self.send_json(request).await?;
        Ok(())
    }
}
