//! The intake pipeline: validate, authenticate, locate the sheet, append.

use chrono::Utc;
use tracing::{info, warn};

use crate::auth::{AccessToken, TokenSource};
use crate::config::Config;
use crate::models::{RsvpRecord, RsvpSubmission};
use crate::sheets::{SheetsBackend, Spreadsheet};
use crate::{Error, Result};

pub const SUCCESS_MESSAGE: &str = "RSVP submitted successfully!";

/// How a submission reached us. Query submissions must name their
/// spreadsheet; JSON submissions may rely on configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionShape {
    Query,
    Json,
}

/// Which spreadsheet to open.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SheetTarget {
    Id(String),
    Name,
}

/// Turns submissions into sheet rows.
pub struct RsvpService {
    config: Config,
    tokens: Box<dyn TokenSource>,
    backend: Box<dyn SheetsBackend>,
}

impl RsvpService {
    pub fn new(
        config: Config,
        tokens: Box<dyn TokenSource>,
        backend: Box<dyn SheetsBackend>,
    ) -> Self {
        Self {
            config,
            tokens,
            backend,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate a submission and append it as one row. Returns the
    /// normalized record that was written.
    pub async fn submit(
        &self,
        shape: SubmissionShape,
        submission: &RsvpSubmission,
    ) -> Result<RsvpRecord> {
        let record = submission.normalize(Utc::now())?;
        let target = self.target_for(shape, submission)?;

        let token = self.tokens.access_token().await?;
        let result = self.append(&token, &target, &record).await;

        if let Err(Error::Auth(_)) = &result {
            // The cached token went bad; make the next request start over.
            self.tokens.invalidate().await;
        }
        result?;

        Ok(record)
    }

    fn target_for(&self, shape: SubmissionShape, submission: &RsvpSubmission) -> Result<SheetTarget> {
        let requested = submission
            .spreadsheet_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match (requested, shape) {
            (Some(id), _) => Ok(SheetTarget::Id(id.to_string())),
            (None, SubmissionShape::Query) => {
                Err(Error::Validation("Spreadsheet ID is required".to_string()))
            }
            (None, SubmissionShape::Json) => Ok(match &self.config.spreadsheet_id {
                Some(id) => SheetTarget::Id(id.clone()),
                None => SheetTarget::Name,
            }),
        }
    }

    async fn append(
        &self,
        token: &AccessToken,
        target: &SheetTarget,
        record: &RsvpRecord,
    ) -> Result<()> {
        let spreadsheet = self.open_spreadsheet(token, target).await?;
        let worksheet = spreadsheet.worksheet(&self.config.worksheet_name)?;
        info!(
            spreadsheet = %spreadsheet.title,
            worksheet = %worksheet.title,
            "Opened worksheet"
        );

        self.backend
            .append_row(token, &worksheet, &record.to_row())
            .await?;
        info!(full_name = %record.full_name, "Successfully appended row");
        Ok(())
    }

    async fn open_spreadsheet(&self, token: &AccessToken, target: &SheetTarget) -> Result<Spreadsheet> {
        let name = &self.config.spreadsheet_name;
        let id = match target {
            SheetTarget::Id(id) => id,
            SheetTarget::Name => return self.backend.open_by_name(token, name).await,
        };

        match self.backend.open(token, id).await {
            Ok(sheet) => Ok(sheet),
            Err(e @ Error::SpreadsheetNotFound(_)) if self.config.spreadsheet_name_fallback => {
                warn!(spreadsheet_id = %id, error = %e, fallback = %name, "Falling back to spreadsheet lookup by name");
                self.backend.open_by_name(token, name).await
            }
            Err(e) => Err(e),
        }
    }
}
