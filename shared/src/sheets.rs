//! Google Sheets backend.
//!
//! The pipeline only needs four things from a spreadsheet service: open by
//! ID, open by name, pick a tab, append a row. `SheetsBackend` is that
//! surface; `GoogleSheetsClient` implements it over the Sheets v4 and
//! Drive v3 REST APIs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::auth::AccessToken;
use crate::{Error, Result};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const DRIVE_FILES_API: &str = "https://www.googleapis.com/drive/v3/files";
const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";

/// An opened spreadsheet and the titles of its tabs.
#[derive(Debug, Clone, PartialEq)]
pub struct Spreadsheet {
    pub id: String,
    pub title: String,
    pub worksheet_titles: Vec<String>,
}

impl Spreadsheet {
    /// Select a tab by exact title.
    pub fn worksheet(&self, name: &str) -> Result<Worksheet> {
        if self.worksheet_titles.iter().any(|t| t == name) {
            Ok(Worksheet {
                spreadsheet_id: self.id.clone(),
                title: name.to_string(),
            })
        } else {
            Err(Error::WorksheetNotFound(name.to_string()))
        }
    }
}

/// A tab inside a spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Worksheet {
    pub spreadsheet_id: String,
    pub title: String,
}

impl Worksheet {
    /// A1 range anchoring appends to this tab. Titles are always quoted so
    /// names with spaces or apostrophes work.
    pub fn append_range(&self) -> String {
        format!("'{}'!A1", self.title.replace('\'', "''"))
    }
}

#[async_trait]
pub trait SheetsBackend: Send + Sync {
    /// Open a spreadsheet by its ID.
    async fn open(&self, token: &AccessToken, id: &str) -> Result<Spreadsheet>;

    /// Open the first spreadsheet visible to us with this exact name.
    async fn open_by_name(&self, token: &AccessToken, name: &str) -> Result<Spreadsheet>;

    /// Append one row after the last row of the tab's table.
    async fn append_row(
        &self,
        token: &AccessToken,
        worksheet: &Worksheet,
        values: &[String],
    ) -> Result<()>;
}

/// Spreadsheet metadata, trimmed by the `fields` mask.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpreadsheetMetadata {
    spreadsheet_id: String,
    properties: SpreadsheetProperties,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetProperties {
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SpreadsheetProperties,
}

impl From<SpreadsheetMetadata> for Spreadsheet {
    fn from(meta: SpreadsheetMetadata) -> Self {
        Self {
            id: meta.spreadsheet_id,
            title: meta.properties.title,
            worksheet_titles: meta.sheets.into_iter().map(|s| s.properties.title).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

/// Google API error body: `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`
#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
}

/// Pull the human-readable message out of a Google error body, falling back
/// to the raw text.
fn google_error_message(body: &str) -> String {
    serde_json::from_str::<GoogleErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// Drive search query for a spreadsheet with this exact name.
fn drive_name_query(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('\'', "\\'");
    format!(
        "name = '{}' and mimeType = '{}' and trashed = false",
        escaped, SPREADSHEET_MIME_TYPE
    )
}

/// Sheets/Drive REST client.
#[derive(Debug, Clone)]
pub struct GoogleSheetsClient {
    http_client: reqwest::Client,
    sheets_api: String,
    drive_files_api: String,
}

impl GoogleSheetsClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            sheets_api: SHEETS_API.to_string(),
            drive_files_api: DRIVE_FILES_API.to_string(),
        }
    }

    /// Point the client at other Sheets and Drive endpoints.
    pub fn with_base_urls(mut self, sheets_api: &str, drive_files_api: &str) -> Self {
        self.sheets_api = sheets_api.trim_end_matches('/').to_string();
        self.drive_files_api = drive_files_api.trim_end_matches('/').to_string();
        self
    }

    /// Map a non-success status to our error taxonomy. 403 and 404 both mean
    /// "we can't see that spreadsheet".
    async fn check(
        response: reqwest::Response,
        not_found: impl FnOnce() -> Error,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = google_error_message(&body);
        warn!(status = status.as_u16(), message = %message, "Google API call failed");

        Err(match status.as_u16() {
            401 => Error::Auth(format!("Google rejected the access token: {}", message)),
            403 | 404 => not_found(),
            _ => Error::Backend(format!("{} {}", status, message)),
        })
    }
}

#[async_trait]
impl SheetsBackend for GoogleSheetsClient {
    async fn open(&self, token: &AccessToken, id: &str) -> Result<Spreadsheet> {
        let url = format!("{}/{}", self.sheets_api, urlencoding::encode(id));
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token.token)
            .query(&[(
                "fields",
                "spreadsheetId,properties.title,sheets.properties.title",
            )])
            .send()
            .await?;

        let response = Self::check(response, || Error::SpreadsheetNotFound(id.to_string())).await?;
        let meta: SpreadsheetMetadata = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Malformed spreadsheet metadata: {}", e)))?;

        Ok(meta.into())
    }

    async fn open_by_name(&self, token: &AccessToken, name: &str) -> Result<Spreadsheet> {
        let query = drive_name_query(name);
        let response = self
            .http_client
            .get(&self.drive_files_api)
            .bearer_auth(&token.token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id)"),
                ("pageSize", "1"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await?;

        let response =
            Self::check(response, || Error::SpreadsheetNotFound(name.to_string())).await?;
        let listing: DriveFileList = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("Malformed Drive listing: {}", e)))?;

        let file = listing
            .files
            .into_iter()
            .next()
            .ok_or_else(|| Error::SpreadsheetNotFound(name.to_string()))?;

        // Report failures against the name the caller asked for.
        self.open(token, &file.id).await.map_err(|e| match e {
            Error::SpreadsheetNotFound(_) => Error::SpreadsheetNotFound(name.to_string()),
            other => other,
        })
    }

    async fn append_row(
        &self,
        token: &AccessToken,
        worksheet: &Worksheet,
        values: &[String],
    ) -> Result<()> {
        let url = format!(
            "{}/{}/values/{}:append",
            self.sheets_api,
            urlencoding::encode(&worksheet.spreadsheet_id),
            urlencoding::encode(&worksheet.append_range())
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&token.token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({
                "majorDimension": "ROWS",
                "values": [values],
            }))
            .send()
            .await?;

        Self::check(response, || {
            Error::SpreadsheetNotFound(worksheet.spreadsheet_id.clone())
        })
        .await?;
        Ok(())
    }
}
