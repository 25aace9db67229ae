//! Locates columns in the response sheet and turns rows into submissions.

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;

use crate::config::PipelineConfig;
use crate::decision::{RowDecision, SkipReason};
use crate::sheet::{CellValue, SheetTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub question: String,
    pub answer: CellValue,
}

/// One form response, extracted from a sheet row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub row_number: usize,
    pub timestamp: CellValue,
    pub response_id: Option<String>,
    pub job_code: String,
    /// Non-empty answers in header order, excluding the job code, response id
    /// and tracking columns.
    pub fields: Vec<Field>,
}

/// Column indexes of the special columns in a response sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub job_code: usize,
    pub timestamp: usize,
    pub response_id: Option<usize>,
    pub tracking: Option<usize>,
}

/// `true` when a header names the response identifier, e.g. `Response ID`.
#[must_use]
pub fn is_response_id_header(header: &str) -> bool {
    let lowered = header.to_lowercase();
    lowered.contains("response") && lowered.contains("id")
}

impl ColumnMap {
    /// Finds the special columns by name.
    ///
    /// The job code and timestamp columns match exactly; the response id
    /// column is the first header mentioning both "response" and "id".
    ///
    /// # Errors
    /// Returns [`SkipReason::MissingColumns`] listing every required column
    /// that is absent.
    pub fn locate(
        table: &SheetTable,
        config: &PipelineConfig,
        require_tracking: bool,
    ) -> Result<Self, SkipReason> {
        let job_code = table.exact_column(&config.job_code_column);
        let timestamp = table.exact_column(&config.timestamp_column);
        let response_id = table
            .headers
            .iter()
            .position(|header| is_response_id_header(header));
        let tracking = table.exact_column(&config.tracking_column);

        let mut missing = Vec::new();
        if job_code.is_none() {
            missing.push(config.job_code_column.clone());
        }
        if timestamp.is_none() {
            missing.push(config.timestamp_column.clone());
        }
        if config.require_response_id && response_id.is_none() {
            missing.push("Response ID".to_string());
        }
        if require_tracking && tracking.is_none() {
            missing.push(config.tracking_column.clone());
        }

        match (job_code, timestamp) {
            (Some(job_code), Some(timestamp)) if missing.is_empty() => Ok(Self {
                job_code,
                timestamp,
                response_id,
                tracking,
            }),
            _ => Err(SkipReason::MissingColumns { columns: missing }),
        }
    }

    fn is_special(&self, column: usize) -> bool {
        column == self.job_code
            || column == self.timestamp
            || Some(column) == self.response_id
            || Some(column) == self.tracking
    }
}

/// Parses a timestamp cell; blank or unparseable cells yield `None`.
#[must_use]
pub fn parse_timestamp(cell: &CellValue, offset: UtcOffset) -> Option<OffsetDateTime> {
    if cell.is_empty() {
        return None;
    }
    cell.as_datetime(offset)
}

/// Index of the data row with the greatest timestamp. Ties keep the first row seen.
#[must_use]
pub fn latest_row_index(table: &SheetTable, columns: &ColumnMap, offset: UtcOffset) -> Option<usize> {
    let mut latest: Option<(usize, OffsetDateTime)> = None;
    for row_index in 0..table.rows.len() {
        let cell = table.cell(row_index, columns.timestamp);
        let Some(moment) = parse_timestamp(cell, offset) else {
            if !cell.is_empty() {
                debug!(
                    row_number = SheetTable::row_number(row_index),
                    "ignoring unparseable timestamp"
                );
            }
            continue;
        };
        match latest {
            Some((_, best)) if moment <= best => {}
            _ => latest = Some((row_index, moment)),
        }
    }
    latest.map(|(row_index, _)| row_index)
}

/// Index of the first data row whose tracking cell is blank.
#[must_use]
pub fn first_unprocessed_row(table: &SheetTable, tracking_column: usize) -> Option<usize> {
    (0..table.rows.len()).find(|&row_index| table.cell(row_index, tracking_column).is_empty())
}

/// Extracts the submission in `row_index`, or the reason it cannot be processed.
///
/// `require_timestamp` is set by batch processing, which refuses rows without one.
#[must_use]
pub fn extract_submission(
    table: &SheetTable,
    row_index: usize,
    columns: &ColumnMap,
    config: &PipelineConfig,
    require_timestamp: bool,
) -> RowDecision {
    let row_number = SheetTable::row_number(row_index);
    let offset = config.offset().unwrap_or(UtcOffset::UTC);

    let job_code = table.cell(row_index, columns.job_code);
    let timestamp = table.cell(row_index, columns.timestamp);
    let response_id = columns
        .response_id
        .map(|column| table.cell(row_index, column))
        .filter(|cell| !cell.is_empty())
        .map(|cell| cell.display_text(offset));

    let mut missing = Vec::new();
    if job_code.is_empty() {
        missing.push(config.job_code_column.clone());
    }
    if require_timestamp && timestamp.is_empty() {
        missing.push(config.timestamp_column.clone());
    }
    if config.require_response_id && response_id.is_none() {
        missing.push("Response ID".to_string());
    }
    if !missing.is_empty() {
        return RowDecision::Skip(SkipReason::MissingFields {
            row_number,
            fields: missing,
        });
    }

    let fields = table
        .headers
        .iter()
        .enumerate()
        .filter(|(column, header)| !header.is_empty() && !columns.is_special(*column))
        .filter_map(|(column, header)| {
            let answer = table.cell(row_index, column);
            (!answer.is_empty()).then(|| Field {
                question: header.clone(),
                answer: answer.clone(),
            })
        })
        .collect();

    RowDecision::Process(Submission {
        row_number,
        timestamp: timestamp.clone(),
        response_id,
        job_code: job_code.display_text(offset),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{must, must_some};

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_string())
    }

    fn sheet(headers: &[&str], rows: Vec<Vec<CellValue>>) -> SheetTable {
        SheetTable {
            name: "Form Responses 1".to_string(),
            headers: headers.iter().map(ToString::to_string).collect(),
            rows,
        }
    }

    fn standard_sheet() -> SheetTable {
        sheet(
            &["Timestamp", "Job Code", "Response ID", "Session Date", "Notes", "Upload Timestamp"],
            vec![
                vec![
                    text("3/14/2024 09:00:00"),
                    text("John S. (ABA)"),
                    text("r-1"),
                    text("3/14/2024"),
                    text("first"),
                    text("3/14/2024 09:05:00"),
                ],
                vec![
                    text("3/15/2024 09:00:00"),
                    text("John S. (ABA)"),
                    text("r-2"),
                    text("3/15/2024"),
                    CellValue::Empty,
                ],
                vec![
                    CellValue::Empty,
                    text("Ana L. (ABA)"),
                    text("r-3"),
                    text("3/16/2024"),
                    text("no timestamp"),
                ],
            ],
        )
    }

    #[test]
    fn columns_locate_by_exact_and_fuzzy_names() {
        let table = sheet(
            &["Timestamp", "Job Code", "Form response id (auto)", "Notes"],
            Vec::new(),
        );
        let columns = must(ColumnMap::locate(&table, &PipelineConfig::default(), false));
        assert_eq!(columns.job_code, 1);
        assert_eq!(columns.timestamp, 0);
        assert_eq!(columns.response_id, Some(2));
        assert_eq!(columns.tracking, None);
    }

    #[test]
    fn missing_required_columns_are_reported_together() {
        let table = sheet(&["Job code", "Notes"], Vec::new());
        let err = ColumnMap::locate(&table, &PipelineConfig::default(), true);
        assert_eq!(
            err,
            Err(SkipReason::MissingColumns {
                columns: vec![
                    "Job Code".to_string(),
                    "Timestamp".to_string(),
                    "Response ID".to_string(),
                    "Upload Timestamp".to_string(),
                ]
            })
        );
    }

    #[test]
    fn response_id_column_is_optional_when_not_required() {
        let table = sheet(&["Timestamp", "Job Code"], Vec::new());
        let config = PipelineConfig {
            require_response_id: false,
            ..PipelineConfig::default()
        };
        let columns = must(ColumnMap::locate(&table, &config, false));
        assert_eq!(columns.response_id, None);
    }

    #[test]
    fn latest_row_wins_and_blank_timestamps_are_skipped() {
        let table = standard_sheet();
        let columns = must(ColumnMap::locate(&table, &PipelineConfig::default(), false));
        assert_eq!(latest_row_index(&table, &columns, UtcOffset::UTC), Some(1));
    }

    #[test]
    fn timestamp_ties_keep_first_seen_row() {
        let table = sheet(
            &["Timestamp", "Job Code", "Response ID"],
            vec![
                vec![text("2024-03-15 09:00:00"), text("A"), text("r-1")],
                vec![text("3/15/2024 09:00:00"), text("B"), text("r-2")],
            ],
        );
        let columns = must(ColumnMap::locate(&table, &PipelineConfig::default(), false));
        assert_eq!(latest_row_index(&table, &columns, UtcOffset::UTC), Some(0));
    }

    #[test]
    fn twelve_hour_timestamps_take_part_in_latest_selection() {
        let table = sheet(
            &["Timestamp", "Job Code", "Response ID"],
            vec![
                vec![text("3/15/2024 9:00:00 AM"), text("A"), text("r-1")],
                vec![text("3/15/2024 1:30:00 PM"), text("B"), text("r-2")],
                vec![text("3/15/2024 11:59:59 AM"), text("C"), text("r-3")],
            ],
        );
        let columns = must(ColumnMap::locate(&table, &PipelineConfig::default(), false));
        assert_eq!(latest_row_index(&table, &columns, UtcOffset::UTC), Some(1));
    }

    #[test]
    fn no_timestamped_rows_selects_nothing() {
        let table = sheet(
            &["Timestamp", "Job Code", "Response ID"],
            vec![vec![CellValue::Empty, text("A"), text("r-1")]],
        );
        let columns = must(ColumnMap::locate(&table, &PipelineConfig::default(), false));
        assert_eq!(latest_row_index(&table, &columns, UtcOffset::UTC), None);
    }

    #[test]
    fn extraction_keeps_non_empty_answers_in_header_order() {
        let table = standard_sheet();
        let config = PipelineConfig::default();
        let columns = must(ColumnMap::locate(&table, &config, false));

        let RowDecision::Process(submission) = extract_submission(&table, 1, &columns, &config, false)
        else {
            panic!("expected submission for row 3");
        };
        assert_eq!(submission.row_number, 3);
        assert_eq!(submission.job_code, "John S. (ABA)");
        assert_eq!(submission.response_id.as_deref(), Some("r-2"));
        assert_eq!(submission.timestamp, text("3/15/2024 09:00:00"));
        let questions: Vec<&str> = submission
            .fields
            .iter()
            .map(|field| field.question.as_str())
            .collect();
        assert_eq!(questions, vec!["Session Date"]);
    }

    #[test]
    fn extraction_skips_rows_missing_required_values() {
        let table = sheet(
            &["Timestamp", "Job Code", "Response ID", "Notes"],
            vec![vec![text("3/15/2024 09:00:00"), CellValue::Empty, CellValue::Empty, text("x")]],
        );
        let config = PipelineConfig::default();
        let columns = must(ColumnMap::locate(&table, &config, false));
        assert_eq!(
            extract_submission(&table, 0, &columns, &config, false),
            RowDecision::Skip(SkipReason::MissingFields {
                row_number: 2,
                fields: vec!["Job Code".to_string(), "Response ID".to_string()],
            })
        );
    }

    #[test]
    fn batch_extraction_requires_timestamp() {
        let table = standard_sheet();
        let config = PipelineConfig::default();
        let columns = must(ColumnMap::locate(&table, &config, true));
        assert!(matches!(
            extract_submission(&table, 2, &columns, &config, true),
            RowDecision::Skip(SkipReason::MissingFields { row_number: 4, .. })
        ));
        assert!(matches!(
            extract_submission(&table, 2, &columns, &config, false),
            RowDecision::Process(_)
        ));
    }

    #[test]
    fn first_unprocessed_row_finds_blank_tracking_cell() {
        let table = standard_sheet();
        let tracking = must_some(table.exact_column("Upload Timestamp"));
        assert_eq!(first_unprocessed_row(&table, tracking), Some(1));
    }
}
