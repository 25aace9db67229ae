//! Trigger entry points: select a row, guard against duplicates, resolve the
//! log document and prepend the note.
//!
//! Entry points never return errors. Each one catches failures, logs them and
//! reports a [`TriggerOutcome`]; a missed submission is recovered by running
//! the batch trigger by hand.

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::decision::{RowDecision, SkipReason, TargetDecision};
use crate::guard::is_note_in_document;
use crate::render::{prepend_note_entry, RenderedEntry};
use crate::resolver::{create_log_document, plan_target};
use crate::selector::{
    extract_submission, first_unprocessed_row, latest_row_index, ColumnMap, Submission,
};
use crate::sheet::{CellValue, SheetTable};
use crate::storage::{DocumentId, DriveStore, ResponseSheet};
use crate::SoapLogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A new form response was appended to the sheet.
    FormSubmit,
    /// The sheet was edited by hand.
    SheetChange,
    /// Process every row from the first one without a tracking stamp, or
    /// every row when all of them are stamped.
    Batch,
    /// Reprocess one specific sheet row.
    Row { row_number: usize },
}

impl Trigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FormSubmit => "form_submit",
            Self::SheetChange => "sheet_change",
            Self::Batch => "batch",
            Self::Row { .. } => "row",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenNote {
    pub row_number: usize,
    pub job_code: String,
    pub response_id: Option<String>,
    pub document_id: DocumentId,
    pub created_document: bool,
    pub entry: RenderedEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Written(WrittenNote),
    Skipped(SkipReason),
    Failed { message: String },
}

impl TriggerOutcome {
    #[must_use]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    pub row_number: usize,
    pub outcome: TriggerOutcome,
    pub marked_processed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BatchReport {
    /// Set when the batch stopped before looking at any row.
    pub aborted: Option<TriggerOutcome>,
    pub rows: Vec<RowOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn written(&self) -> usize {
        self.rows.iter().filter(|row| row.outcome.is_written()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TriggerReport {
    Single(TriggerOutcome),
    Batch(BatchReport),
}

/// Why a step stopped: a planned skip or an unexpected failure.
#[derive(Debug)]
enum Halt {
    Skip(SkipReason),
    Error(SoapLogError),
}

impl From<SoapLogError> for Halt {
    fn from(err: SoapLogError) -> Self {
        Self::Error(err)
    }
}

fn conclude(context: &str, result: Result<WrittenNote, Halt>) -> TriggerOutcome {
    match result {
        Ok(written) => {
            info!(
                context,
                row_number = written.row_number,
                document = %written.document_id,
                "SOAP note prepended to log document"
            );
            TriggerOutcome::Written(written)
        }
        Err(Halt::Skip(reason)) => {
            warn!(context, reason = reason.as_str(), detail = ?reason, "skipped");
            TriggerOutcome::Skipped(reason)
        }
        Err(Halt::Error(err)) => {
            error!(context, error = %err, "processing failed");
            TriggerOutcome::Failed {
                message: err.to_string(),
            }
        }
    }
}

/// Runs triggers against one store with one configuration.
pub struct Pipeline<'a, S: ?Sized> {
    store: &'a mut S,
    config: &'a PipelineConfig,
    offset: UtcOffset,
}

impl<'a, S> Pipeline<'a, S>
where
    S: DriveStore + ResponseSheet + ?Sized,
{
    /// # Errors
    /// Returns [`SoapLogError::Configuration`] when `config` is invalid.
    pub fn new(store: &'a mut S, config: &'a PipelineConfig) -> Result<Self, SoapLogError> {
        config.validate()?;
        let offset = config.offset()?;
        Ok(Self {
            store,
            config,
            offset,
        })
    }

    /// Dispatches `trigger`. `now` stamps the entry marker, names new logs and
    /// marks batch rows.
    pub fn run(&mut self, trigger: Trigger, now: OffsetDateTime) -> TriggerReport {
        info!(trigger = trigger.as_str(), "trigger fired");
        match trigger {
            Trigger::FormSubmit => TriggerReport::Single(self.on_form_submit(now)),
            Trigger::SheetChange => TriggerReport::Single(self.on_sheet_change(now)),
            Trigger::Batch => TriggerReport::Batch(self.run_batch(now)),
            Trigger::Row { row_number } => {
                TriggerReport::Single(self.process_row(row_number, now))
            }
        }
    }

    pub fn on_form_submit(&mut self, now: OffsetDateTime) -> TriggerOutcome {
        let result = self.process_latest(now);
        conclude("form_submit", result)
    }

    pub fn on_sheet_change(&mut self, now: OffsetDateTime) -> TriggerOutcome {
        let result = self.process_latest(now);
        conclude("sheet_change", result)
    }

    /// Reprocesses the row at spreadsheet `row_number` (data starts at row 2).
    /// The duplicate guard still applies; the tracking column is not touched.
    pub fn process_row(&mut self, row_number: usize, now: OffsetDateTime) -> TriggerOutcome {
        let result = self.process_specific_row(row_number, now);
        conclude("row", result)
    }

    /// Processes every row from the first one with a blank tracking cell.
    /// When no tracking cell is blank, every data row is rechecked.
    ///
    /// Written rows, and rows the guard finds already processed, get the
    /// current time in the tracking column. A failing row does not stop the
    /// rows after it.
    pub fn run_batch(&mut self, now: OffsetDateTime) -> BatchReport {
        match self.batch_rows(now) {
            Ok(rows) => BatchReport {
                aborted: None,
                rows,
            },
            Err(halt) => BatchReport {
                aborted: Some(conclude("batch", Err(halt))),
                rows: Vec::new(),
            },
        }
    }

    fn process_latest(&mut self, now: OffsetDateTime) -> Result<WrittenNote, Halt> {
        let table = self.load_sheet()?;
        let columns = ColumnMap::locate(&table, self.config, false).map_err(Halt::Skip)?;
        let row_index = latest_row_index(&table, &columns, self.offset)
            .ok_or(Halt::Skip(SkipReason::NoTimestampedRows))?;
        info!(
            row_number = SheetTable::row_number(row_index),
            "selected latest submission"
        );
        let submission = Self::submission_at(&table, row_index, &columns, self.config, false)?;
        self.check_duplicate(&submission)?;
        self.write_note(&submission, now)
    }

    fn process_specific_row(
        &mut self,
        row_number: usize,
        now: OffsetDateTime,
    ) -> Result<WrittenNote, Halt> {
        let table = self.load_sheet()?;
        let columns = ColumnMap::locate(&table, self.config, false).map_err(Halt::Skip)?;
        let row_index = SheetTable::row_index(row_number)
            .filter(|index| *index < table.rows.len())
            .ok_or(Halt::Skip(SkipReason::RowOutOfRange { row_number }))?;
        let submission = Self::submission_at(&table, row_index, &columns, self.config, false)?;
        self.check_duplicate(&submission)?;
        self.write_note(&submission, now)
    }

    fn batch_rows(&mut self, now: OffsetDateTime) -> Result<Vec<RowOutcome>, Halt> {
        let table = self.load_sheet()?;
        let columns = ColumnMap::locate(&table, self.config, true).map_err(Halt::Skip)?;
        let tracking = columns.tracking.ok_or_else(|| {
            Halt::Skip(SkipReason::MissingColumns {
                columns: vec![self.config.tracking_column.clone()],
            })
        })?;
        let start = first_unprocessed_row(&table, tracking).unwrap_or_else(|| {
            info!("every row carries a tracking stamp; rechecking from the first data row");
            0
        });
        info!(
            from_row = SheetTable::row_number(start),
            to_row = SheetTable::row_number(table.rows.len() - 1),
            "starting batch"
        );

        let mut outcomes = Vec::with_capacity(table.rows.len() - start);
        for row_index in start..table.rows.len() {
            outcomes.push(self.batch_row(&table, row_index, &columns, tracking, now));
        }
        Ok(outcomes)
    }

    fn batch_row(
        &mut self,
        table: &SheetTable,
        row_index: usize,
        columns: &ColumnMap,
        tracking: usize,
        now: OffsetDateTime,
    ) -> RowOutcome {
        let row_number = SheetTable::row_number(row_index);
        let submission = match Self::submission_at(table, row_index, columns, self.config, true) {
            Ok(submission) => submission,
            Err(halt) => {
                return RowOutcome {
                    row_number,
                    outcome: conclude("batch", Err(halt)),
                    marked_processed: false,
                }
            }
        };

        let (result, should_mark) = match self.check_duplicate(&submission) {
            Ok(()) => {
                let result = self.write_note(&submission, now);
                let written = result.is_ok();
                (result, written)
            }
            Err(halt) => {
                let duplicate = matches!(halt, Halt::Skip(SkipReason::AlreadyProcessed { .. }));
                (Err(halt), duplicate)
            }
        };

        let marked_processed = should_mark && self.mark_processed(row_number, tracking, now);
        RowOutcome {
            row_number,
            outcome: conclude("batch", result),
            marked_processed,
        }
    }

    fn load_sheet(&self) -> Result<SheetTable, Halt> {
        let sheet_name = &self.config.sheet_name;
        let Some(table) = self.store.load_sheet(sheet_name)? else {
            return Err(Halt::Skip(SkipReason::SheetNotFound {
                sheet: sheet_name.clone(),
            }));
        };
        if table.rows.is_empty() {
            return Err(Halt::Skip(SkipReason::NoDataRows));
        }
        info!(sheet = %table.name, headers = %table.headers.join(", "), "loaded response sheet");
        Ok(table)
    }

    fn submission_at(
        table: &SheetTable,
        row_index: usize,
        columns: &ColumnMap,
        config: &PipelineConfig,
        require_timestamp: bool,
    ) -> Result<Submission, Halt> {
        match extract_submission(table, row_index, columns, config, require_timestamp) {
            RowDecision::Process(submission) => Ok(submission),
            RowDecision::Skip(reason) => Err(Halt::Skip(reason)),
        }
    }

    fn check_duplicate(&self, submission: &Submission) -> Result<(), Halt> {
        let Some(response_id) = submission.response_id.as_deref() else {
            return Ok(());
        };
        if is_note_in_document(&*self.store, &submission.job_code, response_id, self.config) {
            return Err(Halt::Skip(SkipReason::AlreadyProcessed {
                row_number: submission.row_number,
                response_id: response_id.to_string(),
            }));
        }
        Ok(())
    }

    fn write_note(
        &mut self,
        submission: &Submission,
        now: OffsetDateTime,
    ) -> Result<WrittenNote, Halt> {
        let now = now.to_offset(self.offset);
        let today = now.date();

        let (document_id, created_document) =
            match plan_target(&mut *self.store, &submission.job_code, self.config, today)? {
                TargetDecision::Skip(reason) => return Err(Halt::Skip(reason)),
                TargetDecision::Append { document, .. } => (document, false),
                TargetDecision::Create { folder, name, .. } => {
                    info!(name = %name, "no log document found; creating one");
                    let document =
                        create_log_document(&mut *self.store, &submission.job_code, &folder, today)?;
                    (document, true)
                }
            };

        let options = self.config.render_options()?;
        let mut body = self.store.open_document(&document_id)?;
        let entry = prepend_note_entry(&mut body, submission, now, &options)?;
        self.store.save_document(&document_id, &body)?;

        Ok(WrittenNote {
            row_number: submission.row_number,
            job_code: submission.job_code.clone(),
            response_id: submission.response_id.clone(),
            document_id,
            created_document,
            entry,
        })
    }

    fn mark_processed(&mut self, row_number: usize, tracking: usize, now: OffsetDateTime) -> bool {
        let stamp = CellValue::DateTime(now.to_offset(self.offset));
        match self
            .store
            .set_cell(&self.config.sheet_name, row_number, tracking, &stamp)
        {
            Ok(()) => {
                info!(row_number, "marked row as processed");
                true
            }
            Err(err) => {
                error!(row_number, error = %err, "failed to mark row as processed");
                false
            }
        }
    }
}
