//! In-memory stand-ins for the token source and spreadsheet backend, for
//! exercising the pipeline without Google.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};

use crate::auth::{AccessToken, TokenSource};
use crate::sheets::{SheetsBackend, Spreadsheet, Worksheet};
use crate::{Error, Result};

#[derive(Default)]
pub struct FakeTokens {
    pub fail: bool,
    pub invalidations: Arc<Mutex<u32>>,
}

#[async_trait]
impl TokenSource for FakeTokens {
    async fn access_token(&self) -> Result<AccessToken> {
        if self.fail {
            return Err(Error::Auth("No usable credentials found.".to_string()));
        }
        Ok(AccessToken {
            token: "test-token".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn invalidate(&self) {
        *self.invalidations.lock().unwrap() += 1;
    }
}

/// Spreadsheets keyed by ID; records every call it receives.
#[derive(Default, Clone)]
pub struct FakeBackend {
    pub sheets: Vec<Spreadsheet>,
    pub append_error: Option<fn() -> Error>,
    pub calls: Arc<Mutex<Vec<String>>>,
    pub rows: Arc<Mutex<Vec<(Worksheet, Vec<String>)>>>,
}

impl FakeBackend {
    pub fn with_sheet(id: &str, title: &str, tabs: &[&str]) -> Self {
        Self {
            sheets: vec![Spreadsheet {
                id: id.to_string(),
                title: title.to_string(),
                worksheet_titles: tabs.iter().map(|t| t.to_string()).collect(),
            }],
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rows(&self) -> Vec<(Worksheet, Vec<String>)> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetsBackend for FakeBackend {
    async fn open(&self, _token: &AccessToken, id: &str) -> Result<Spreadsheet> {
        self.calls.lock().unwrap().push(format!("open:{}", id));
        self.sheets
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| Error::SpreadsheetNotFound(id.to_string()))
    }

    async fn open_by_name(&self, _token: &AccessToken, name: &str) -> Result<Spreadsheet> {
        self.calls.lock().unwrap().push(format!("open_by_name:{}", name));
        self.sheets
            .iter()
            .find(|s| s.title == name)
            .cloned()
            .ok_or_else(|| Error::SpreadsheetNotFound(name.to_string()))
    }

    async fn append_row(
        &self,
        _token: &AccessToken,
        worksheet: &Worksheet,
        values: &[String],
    ) -> Result<()> {
        self.calls.lock().unwrap().push(format!("append:{}", worksheet.title));
        if let Some(make_error) = self.append_error {
            return Err(make_error());
        }
        self.rows
            .lock()
            .unwrap()
            .push((worksheet.clone(), values.to_vec()));
        Ok(())
    }
}
