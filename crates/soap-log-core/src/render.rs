//! Lays a submission out as a note entry at the top of a log document.

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};

use crate::date::{format_entry_timestamp, format_session_date};
use crate::document::{DocumentBody, Table};
use crate::note_type::NoteType;
use crate::selector::{Field, Submission};
use crate::sheet::CellValue;
use crate::SoapLogError;

pub const SECTION_HEADER: &str = "Session Notes";
pub const HEADER_FONT_SIZE: u8 = 13;
pub const LABEL_COLUMN_WIDTH: u16 = 160;
pub const VALUE_COLUMN_WIDTH: u16 = 400;

/// Element offsets of a freshly inserted entry.
const RULE_POSITION: usize = 0;
const MARKER_POSITION: usize = 1;
const TABLE_POSITION: usize = 2;
const SPACER_POSITION: usize = 3;

/// Question names with special rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions<'a> {
    pub timestamp_question: &'a str,
    pub note_type_question: &'a str,
    pub session_date_question: &'a str,
    pub offset: UtcOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteRow {
    pub label: String,
    pub value: String,
}

/// What [`prepend_note_entry`] wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedEntry {
    pub marker: String,
    pub note_type: String,
    pub header_color: Option<String>,
    pub rows: Vec<NoteRow>,
    pub table_inserted: bool,
}

/// Inserts a styled label/value table at `position`.
///
/// Row 0 holds `header`; header cells are bold, underlined and enlarged, and
/// take `header_color` when given. Value cells in body rows are forced
/// non-bold. Every row uses the same narrow-label, wide-value widths.
///
/// # Errors
/// Returns [`SoapLogError::Validation`] when `position` is past the end of the body.
pub fn render_note_table(
    body: &mut DocumentBody,
    header: [&str; 2],
    rows: &[NoteRow],
    header_color: Option<&str>,
    position: usize,
) -> Result<(), SoapLogError> {
    let mut text_rows = Vec::with_capacity(rows.len() + 1);
    text_rows.push(header.iter().map(ToString::to_string).collect::<Vec<_>>());
    text_rows.extend(rows.iter().map(|row| vec![row.label.clone(), row.value.clone()]));

    let table = body.insert_table(position, Table::from_text_rows(&text_rows))?;

    if let Some(header_row) = table.rows.first_mut() {
        for cell in &mut header_row.cells {
            cell.style.bold = Some(true);
            cell.style.font_size = Some(HEADER_FONT_SIZE);
            cell.style.underline = true;
            if let Some(color) = header_color {
                cell.style.background_color = Some(color.to_string());
            }
        }
    }

    for row in &mut table.rows {
        if let Some(label) = row.cells.get_mut(0) {
            label.style.width = Some(LABEL_COLUMN_WIDTH);
        }
        if let Some(value) = row.cells.get_mut(1) {
            value.style.width = Some(VALUE_COLUMN_WIDTH);
        }
    }

    for row in table.rows.iter_mut().skip(1) {
        if let Some(value) = row.cells.get_mut(1) {
            value.style.bold = Some(false);
        }
    }

    Ok(())
}

/// Converts answers into table rows, dropping the timestamp and note-type
/// questions and canonicalizing the session date.
#[must_use]
pub fn note_rows(fields: &[Field], options: &RenderOptions<'_>) -> Vec<NoteRow> {
    fields
        .iter()
        .filter(|field| {
            field.question != options.timestamp_question
                && field.question != options.note_type_question
        })
        .map(|field| NoteRow {
            label: field.question.clone(),
            value: answer_text(field, options),
        })
        .collect()
}

fn answer_text(field: &Field, options: &RenderOptions<'_>) -> String {
    match &field.answer {
        CellValue::List(items) => items.join(", "),
        answer if field.question == options.session_date_question => {
            format_session_date(answer, options.offset)
        }
        answer => answer.display_text(options.offset),
    }
}

/// The note type answer, or an empty unknown type when the question is absent.
#[must_use]
pub fn note_type_of(fields: &[Field], options: &RenderOptions<'_>) -> NoteType {
    fields
        .iter()
        .find(|field| field.question == options.note_type_question)
        .map_or_else(
            || NoteType::Other(String::new()),
            |field| NoteType::parse(&field.answer.display_text(options.offset)),
        )
}

/// Renders the default note layout; returns `false` when there were no rows
/// to render, in which case nothing is inserted.
///
/// # Errors
/// Returns [`SoapLogError::Validation`] when `position` is past the end of the body.
pub fn render_default_note(
    body: &mut DocumentBody,
    fields: &[Field],
    note_type: &NoteType,
    position: usize,
    options: &RenderOptions<'_>,
) -> Result<bool, SoapLogError> {
    let rows = note_rows(fields, options);
    if rows.is_empty() {
        return Ok(false);
    }
    render_note_table(
        body,
        [SECTION_HEADER, note_type.display()],
        &rows,
        note_type.header_color(),
        position,
    )?;
    Ok(true)
}

/// Entry marker line, e.g. `SOAP Note Entry: 3/15/2024, 2:05:09 PM [Response ID: r-1]`.
#[must_use]
pub fn entry_marker(now: OffsetDateTime, response_id: Option<&str>) -> String {
    let mut marker = format!("SOAP Note Entry: {}", format_entry_timestamp(now));
    if let Some(id) = response_id {
        marker.push_str(" [Response ID: ");
        marker.push_str(id);
        marker.push(']');
    }
    marker
}

/// Prepends a complete entry: rule, bold marker, note table and a spacer.
/// Without a table the spacer follows the marker directly.
///
/// The edits are applied in sequence with no rollback; a failure part-way
/// leaves the earlier inserts in `body`.
///
/// # Errors
/// Returns [`SoapLogError::Validation`] if an insert position is out of bounds.
pub fn prepend_note_entry(
    body: &mut DocumentBody,
    submission: &Submission,
    now: OffsetDateTime,
    options: &RenderOptions<'_>,
) -> Result<RenderedEntry, SoapLogError> {
    let marker = entry_marker(now.to_offset(options.offset), submission.response_id.as_deref());
    let note_type = note_type_of(&submission.fields, options);

    body.insert_horizontal_rule(RULE_POSITION)?;
    body.insert_paragraph(MARKER_POSITION, marker.clone(), true)?;
    let table_inserted =
        render_default_note(body, &submission.fields, &note_type, TABLE_POSITION, options)?;
    let spacer_position = if table_inserted {
        SPACER_POSITION
    } else {
        TABLE_POSITION
    };
    body.insert_paragraph(spacer_position, "", false)?;

    Ok(RenderedEntry {
        marker,
        note_type: note_type.display().to_string(),
        header_color: note_type.header_color().map(str::to_string),
        rows: note_rows(&submission.fields, options),
        table_inserted,
    })
}
