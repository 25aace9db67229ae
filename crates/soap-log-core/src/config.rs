use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::date::parse_offset;
use crate::render::RenderOptions;
use crate::SoapLogError;

/// Names and knobs shared by every trigger.
///
/// Every field has a default, so a partial config file only needs to name
/// what differs from the stock form layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub sheet_name: String,
    pub job_code_column: String,
    pub timestamp_column: String,
    pub tracking_column: String,
    pub note_type_question: String,
    pub session_date_question: String,
    pub notes_folder_name: String,
    pub fallback_document_name: String,
    pub require_response_id: bool,
    /// Local time zone as a fixed `±HH:MM` offset.
    pub utc_offset: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Form Responses 1".to_string(),
            job_code_column: "Job Code".to_string(),
            timestamp_column: "Timestamp".to_string(),
            tracking_column: "Upload Timestamp".to_string(),
            note_type_question: "Select SOAP Note Type".to_string(),
            session_date_question: "Session Date".to_string(),
            notes_folder_name: "Session Notes (S.O.A.P.)".to_string(),
            fallback_document_name: "Client SOAP Notes".to_string(),
            require_response_id: true,
            utc_offset: "+00:00".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Checks that every name is usable and the offset parses.
    ///
    /// # Errors
    /// Returns [`SoapLogError::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), SoapLogError> {
        for (name, value) in [
            ("sheet_name", &self.sheet_name),
            ("job_code_column", &self.job_code_column),
            ("timestamp_column", &self.timestamp_column),
            ("tracking_column", &self.tracking_column),
            ("note_type_question", &self.note_type_question),
            ("session_date_question", &self.session_date_question),
            ("notes_folder_name", &self.notes_folder_name),
            ("fallback_document_name", &self.fallback_document_name),
        ] {
            if value.trim().is_empty() {
                return Err(SoapLogError::Configuration(format!(
                    "{name} MUST be a non-empty name"
                )));
            }
        }

        if self.job_code_column == self.timestamp_column {
            return Err(SoapLogError::Configuration(
                "job_code_column and timestamp_column MUST differ".to_string(),
            ));
        }

        self.offset()?;
        Ok(())
    }

    /// # Errors
    /// Returns [`SoapLogError::Configuration`] when `utc_offset` is malformed.
    pub fn offset(&self) -> Result<UtcOffset, SoapLogError> {
        parse_offset(&self.utc_offset)
    }

    /// # Errors
    /// Returns [`SoapLogError::Configuration`] when `utc_offset` is malformed.
    pub fn render_options(&self) -> Result<RenderOptions<'_>, SoapLogError> {
        Ok(RenderOptions {
            timestamp_question: &self.timestamp_column,
            note_type_question: &self.note_type_question,
            session_date_question: &self.session_date_question,
            offset: self.offset()?,
        })
    }
}
