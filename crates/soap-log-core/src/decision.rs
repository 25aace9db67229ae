//! Tagged outcomes for each branch of the processing state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::code::ClientCode;
use crate::selector::Submission;
use crate::storage::{ContainerId, DocumentId, FolderId};

/// Why a trigger, or one row of a batch, ended without writing a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    SheetNotFound { sheet: String },
    NoDataRows,
    MissingColumns { columns: Vec<String> },
    NoTimestampedRows,
    RowOutOfRange { row_number: usize },
    MissingFields { row_number: usize, fields: Vec<String> },
    AlreadyProcessed { row_number: usize, response_id: String },
    ContainerNotFound { job_code: String },
    NoDerivableCode { job_code: String },
}

impl SkipReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SheetNotFound { .. } => "sheet_not_found",
            Self::NoDataRows => "no_data_rows",
            Self::MissingColumns { .. } => "missing_columns",
            Self::NoTimestampedRows => "no_timestamped_rows",
            Self::RowOutOfRange { .. } => "row_out_of_range",
            Self::MissingFields { .. } => "missing_fields",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::ContainerNotFound { .. } => "container_not_found",
            Self::NoDerivableCode { .. } => "no_derivable_code",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowDecision {
    Process(Submission),
    Skip(SkipReason),
}

/// Where a note for one client will be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDecision {
    /// An existing log document matched the client's prefix.
    Append {
        container: ContainerId,
        folder: FolderId,
        document: DocumentId,
    },
    /// No log matched; a new one is to be created under `name`.
    Create {
        container: ContainerId,
        folder: FolderId,
        code: ClientCode,
        name: String,
    },
    Skip(SkipReason),
}
