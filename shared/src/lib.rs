//! Shared library for the RSVP intake function.
//!
//! This crate holds everything except the Lambda entry point: configuration,
//! the RSVP models, Google credential resolution, the Sheets client and the
//! intake pipeline that ties them together.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod rsvp;
pub mod secrets;
pub mod sheets;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{AccessToken, Authenticator, GoogleCredentials, TokenSource};
pub use config::{Config, CredentialStrategy};
pub use error::{Error, Result};
pub use http::ApiResponse;
pub use models::{RsvpRecord, RsvpSubmission};
pub use rsvp::{RsvpService, SubmissionShape};
pub use sheets::{GoogleSheetsClient, SheetsBackend, Spreadsheet, Worksheet};
