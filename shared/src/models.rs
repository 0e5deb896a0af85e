//! RSVP data models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Header row the appended values line up with. Changing this order breaks
/// every existing response sheet.
pub const SHEET_COLUMNS: [&str; 10] = [
    "Full Name",
    "Dietary Requirements",
    "Rehearsal Dinner",
    "Ceremony",
    "Brunch",
    "Plus One Name",
    "Plus One Dietary Requirements",
    "Plus One Rehearsal Dinner",
    "Plus One Ceremony",
    "Plus One Brunch",
];

/// A validated RSVP, echoed back to the caller as `details`.
///
/// Attendance flags are `None` when the guest didn't answer, which is not
/// the same as answering "no".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsvpRecord {
    pub full_name: String,
    pub dietary_requirements: Option<String>,
    pub rehearsal_dinner: Option<bool>,
    pub ceremony: Option<bool>,
    pub brunch: Option<bool>,
    pub plus_one_name: Option<String>,
    pub plus_one_dietary_requirements: Option<String>,
    pub plus_one_rehearsal_dinner: Option<bool>,
    pub plus_one_ceremony: Option<bool>,
    pub plus_one_brunch: Option<bool>,
    pub timestamp: String,
}

impl RsvpRecord {
    /// Values for one sheet row, in `SHEET_COLUMNS` order.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.full_name.clone(),
            self.dietary_requirements.clone().unwrap_or_default(),
            yes_no(self.rehearsal_dinner).to_string(),
            yes_no(self.ceremony).to_string(),
            yes_no(self.brunch).to_string(),
            self.plus_one_name.clone().unwrap_or_default(),
            self.plus_one_dietary_requirements.clone().unwrap_or_default(),
            yes_no(self.plus_one_rehearsal_dinner).to_string(),
            yes_no(self.plus_one_ceremony).to_string(),
            yes_no(self.plus_one_brunch).to_string(),
        ]
    }
}

/// Untrusted submission as it arrives, before validation.
///
/// JSON bodies use snake_case keys; the camelCase query parameter names are
/// accepted as aliases so one client payload works for both shapes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RsvpSubmission {
    #[serde(default, alias = "spreadsheetId")]
    pub spreadsheet_id: Option<String>,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default, alias = "dietaryRequirements")]
    pub dietary_requirements: Option<String>,
    #[serde(default, alias = "rehearsalDinner", deserialize_with = "flag_text")]
    pub rehearsal_dinner: Option<String>,
    #[serde(default, deserialize_with = "flag_text")]
    pub ceremony: Option<String>,
    #[serde(default, deserialize_with = "flag_text")]
    pub brunch: Option<String>,
    #[serde(default, alias = "plus1Name")]
    pub plus_one_name: Option<String>,
    #[serde(default, alias = "plus1DietaryRequirements")]
    pub plus_one_dietary_requirements: Option<String>,
    #[serde(default, alias = "plus1RehearsalDinner", deserialize_with = "flag_text")]
    pub plus_one_rehearsal_dinner: Option<String>,
    #[serde(default, alias = "plus1Ceremony", deserialize_with = "flag_text")]
    pub plus_one_ceremony: Option<String>,
    #[serde(default, alias = "plus1Brunch", deserialize_with = "flag_text")]
    pub plus_one_brunch: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub callback: Option<String>,
}

impl RsvpSubmission {
    /// Build a submission from query-string parameters (the JSONP form).
    pub fn from_query<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            spreadsheet_id: get("spreadsheetId"),
            full_name: get("fullName"),
            dietary_requirements: get("dietaryRequirements"),
            rehearsal_dinner: get("rehearsalDinner"),
            ceremony: get("ceremony"),
            brunch: get("brunch"),
            plus_one_name: get("plus1Name"),
            plus_one_dietary_requirements: get("plus1DietaryRequirements"),
            plus_one_rehearsal_dinner: get("plus1RehearsalDinner"),
            plus_one_ceremony: get("plus1Ceremony"),
            plus_one_brunch: get("plus1Brunch"),
            timestamp: get("timestamp"),
            callback: get("callback"),
        }
    }

    /// Validate and normalize into a record. `now` stamps submissions that
    /// arrive without a timestamp.
    pub fn normalize(&self, now: DateTime<Utc>) -> Result<RsvpRecord> {
        let full_name = clean_text(self.full_name.as_deref())
            .ok_or_else(|| Error::Validation("Full name is required".to_string()))?;

        let timestamp = match self.timestamp.as_deref() {
            Some(ts) if !ts.is_empty() => ts.to_string(),
            _ => now.to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        Ok(RsvpRecord {
            full_name,
            dietary_requirements: clean_text(self.dietary_requirements.as_deref()),
            rehearsal_dinner: parse_flag(self.rehearsal_dinner.as_deref()),
            ceremony: parse_flag(self.ceremony.as_deref()),
            brunch: parse_flag(self.brunch.as_deref()),
            plus_one_name: clean_text(self.plus_one_name.as_deref()),
            plus_one_dietary_requirements: clean_text(
                self.plus_one_dietary_requirements.as_deref(),
            ),
            plus_one_rehearsal_dinner: parse_flag(self.plus_one_rehearsal_dinner.as_deref()),
            plus_one_ceremony: parse_flag(self.plus_one_ceremony.as_deref()),
            plus_one_brunch: parse_flag(self.plus_one_brunch.as_deref()),
            timestamp,
        })
    }
}

/// Decode a form flag: exactly `"1"` is yes, exactly `"0"` is no, and
/// anything else (including nothing) means the guest didn't say.
pub fn parse_flag(value: Option<&str>) -> Option<bool> {
    match value {
        Some("1") => Some(true),
        Some("0") => Some(false),
        _ => None,
    }
}

/// Cell text for a flag.
pub fn yes_no(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "",
    }
}

/// Trim, treating empty as absent.
fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Accept flags as `"1"`/`"0"` strings, JSON booleans or the numbers 1/0.
/// Other JSON types are treated as unanswered rather than rejected.
fn flag_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Bool(b)) => Some(if b { "1" } else { "0" }.to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
