//! Response sheet cell model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{OffsetDateTime, UtcOffset};

use crate::date::{format_cell_datetime, parse_sheet_datetime};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    /// Multi-valued answer, e.g. a checkbox question.
    List(Vec<String>),
}

static EMPTY_CELL: CellValue = CellValue::Empty;

impl CellValue {
    /// `true` for blank cells. Whitespace-only text is still an answer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Number(_) | Self::Bool(_) | Self::DateTime(_) => false,
        }
    }

    /// Plain text conversion used for table cells and identifiers.
    #[must_use]
    pub fn display_text(&self, offset: UtcOffset) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(text) => text.clone(),
            Self::Number(number) => format_number(*number),
            Self::Bool(flag) => flag.to_string(),
            Self::DateTime(moment) => format_cell_datetime(*moment, offset),
            Self::List(items) => items.join(", "),
        }
    }

    /// Reads the cell as a point in time, parsing text cells.
    #[must_use]
    pub fn as_datetime(&self, offset: UtcOffset) -> Option<OffsetDateTime> {
        match self {
            Self::DateTime(moment) => Some(*moment),
            Self::Text(raw) => parse_sheet_datetime(raw, offset),
            _ => None,
        }
    }

    /// Maps a loosely-typed JSON answer onto a cell.
    ///
    /// Strings stay text (date parsing happens where dates are needed), arrays
    /// become multi-valued answers and objects are kept as their JSON text.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => number
                .as_f64()
                .map_or_else(|| Self::Text(number.to_string()), Self::Number),
            Value::String(text) => Self::Text(text.clone()),
            Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Object(_) => Self::Text(value.to_string()),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

/// A response sheet: one header row plus data rows.
///
/// Row numbers follow spreadsheet convention: the header is row 1 and the
/// first data row is row 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetTable {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetTable {
    pub const FIRST_DATA_ROW: usize = 2;

    #[must_use]
    pub fn cell(&self, row_index: usize, column_index: usize) -> &CellValue {
        self.rows
            .get(row_index)
            .and_then(|row| row.get(column_index))
            .unwrap_or(&EMPTY_CELL)
    }

    #[must_use]
    pub fn row_number(row_index: usize) -> usize {
        row_index + Self::FIRST_DATA_ROW
    }

    #[must_use]
    pub fn row_index(row_number: usize) -> Option<usize> {
        row_number.checked_sub(Self::FIRST_DATA_ROW)
    }

    #[must_use]
    pub fn exact_column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn display_text_matches_sheet_rendering() {
        let offset = UtcOffset::UTC;
        assert_eq!(CellValue::Number(42.0).display_text(offset), "42");
        assert_eq!(CellValue::Number(2.5).display_text(offset), "2.5");
        assert_eq!(CellValue::Bool(true).display_text(offset), "true");
        assert_eq!(
            CellValue::List(vec!["Mand".to_string(), "Tact".to_string()]).display_text(offset),
            "Mand, Tact"
        );
        assert_eq!(
            CellValue::DateTime(datetime!(2024-03-15 09:05:00 UTC)).display_text(offset),
            "3/15/2024 9:05:00"
        );
    }

    #[test]
    fn json_answers_map_to_cells() {
        assert_eq!(CellValue::from_json(&json!(null)), CellValue::Empty);
        assert_eq!(
            CellValue::from_json(&json!("Supervision")),
            CellValue::Text("Supervision".to_string())
        );
        assert_eq!(
            CellValue::from_json(&json!(["a", 1])),
            CellValue::List(vec!["a".to_string(), "1".to_string()])
        );
        assert_eq!(CellValue::from_json(&json!(3)), CellValue::Number(3.0));
    }

    #[test]
    fn blank_detection_keeps_whitespace_answers() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::Text(String::new()).is_empty());
        assert!(!CellValue::Text(" ".to_string()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }

    #[test]
    fn out_of_range_cells_read_as_empty() {
        let table = SheetTable {
            name: "Form Responses 1".to_string(),
            headers: vec!["Timestamp".to_string()],
            rows: vec![vec![CellValue::Text("x".to_string())]],
        };
        assert_eq!(table.cell(0, 5), &CellValue::Empty);
        assert_eq!(table.cell(9, 0), &CellValue::Empty);
        assert_eq!(SheetTable::row_number(0), 2);
        assert_eq!(SheetTable::row_index(1), None);
    }
}
