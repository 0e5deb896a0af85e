//! Error types for the RSVP intake service.
//!
//! The `Display` text of each variant is what callers see in the `error`
//! field of the response envelope, so messages are written for humans.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling an RSVP submission.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or blank required field
    #[error("{0}")]
    Validation(String),

    /// No usable Google credentials, or the backend rejected our token
    #[error("Could not authenticate with Google Sheets. {0}")]
    Auth(String),

    /// Shared API key missing or mismatched
    #[error("{0}")]
    Unauthorized(String),

    /// Spreadsheet lookup failed (bad identifier or not shared with us)
    #[error("Google Sheet '{0}' not found. Check spreadsheetId and sharing permissions.")]
    SpreadsheetNotFound(String),

    /// No tab with the configured title
    #[error("Worksheet '{0}' not found. Check the worksheet name.")]
    WorksheetNotFound(String),

    /// Any other failure talking to the spreadsheet API
    #[error("An error occurred while submitting your RSVP: {0}")]
    Backend(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    ///
    /// Only used on the JSON POST path; JSONP callers always get a 200.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::Serialization(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::SpreadsheetNotFound(_) | Error::WorksheetNotFound(_) => 404,
            Error::Backend(_) => 502,
            _ => 500,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Backend(e.to_string())
    }
}
