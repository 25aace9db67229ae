//! Structured document body: the editable surface of a log document.
//!
//! Bodies are edited in memory with index-based inserts and then committed
//! back to the store as a whole.

use serde::{Deserialize, Serialize};

use crate::SoapLogError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentBody {
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Element {
    HorizontalRule,
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    pub text: String,
    pub bold: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    #[serde(default)]
    pub style: CellStyle,
}

/// Cell attributes. `None` means "inherit the document default".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CellStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u8>,
    #[serde(default)]
    pub underline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u16>,
}

impl Table {
    /// Builds an unstyled table from rows of cell text.
    #[must_use]
    pub fn from_text_rows(rows: &[Vec<String>]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| TableRow {
                    cells: row
                        .iter()
                        .map(|text| TableCell {
                            text: text.clone(),
                            style: CellStyle::default(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .map(|cell| cell.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DocumentBody {
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Inserts `element` before the element currently at `index`.
    ///
    /// # Errors
    /// Returns [`SoapLogError::Validation`] when `index` is past the end of the body.
    pub fn insert(&mut self, index: usize, element: Element) -> Result<(), SoapLogError> {
        if index > self.elements.len() {
            return Err(SoapLogError::Validation(format!(
                "insert index {index} is out of bounds for body of {} elements",
                self.elements.len()
            )));
        }
        self.elements.insert(index, element);
        Ok(())
    }

    /// # Errors
    /// See [`DocumentBody::insert`].
    pub fn insert_horizontal_rule(&mut self, index: usize) -> Result<(), SoapLogError> {
        self.insert(index, Element::HorizontalRule)
    }

    /// # Errors
    /// See [`DocumentBody::insert`].
    pub fn insert_paragraph(
        &mut self,
        index: usize,
        text: impl Into<String>,
        bold: bool,
    ) -> Result<(), SoapLogError> {
        self.insert(
            index,
            Element::Paragraph(Paragraph {
                text: text.into(),
                bold,
            }),
        )
    }

    /// Inserts `table` and returns a handle for styling it in place.
    ///
    /// # Errors
    /// See [`DocumentBody::insert`].
    pub fn insert_table(&mut self, index: usize, table: Table) -> Result<&mut Table, SoapLogError> {
        self.insert(index, Element::Table(table))?;
        match self.elements.get_mut(index) {
            Some(Element::Table(table)) => Ok(table),
            _ => Err(SoapLogError::Validation(format!(
                "table missing at index {index} after insert"
            ))),
        }
    }

    /// Full plain text of the body, one line per paragraph and table row.
    #[must_use]
    pub fn text(&self) -> String {
        self.elements
            .iter()
            .map(|element| match element {
                Element::HorizontalRule => String::new(),
                Element::Paragraph(paragraph) => paragraph.text.clone(),
                Element::Table(table) => table.text(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::must;

    #[test]
    fn inserts_shift_existing_content_down() {
        let mut body = DocumentBody::default();
        must(body.insert_paragraph(0, "older entry", false));
        must(body.insert_horizontal_rule(0));
        must(body.insert_paragraph(1, "newer entry", true));

        assert_eq!(body.len(), 3);
        assert_eq!(body.elements[0], Element::HorizontalRule);
        assert_eq!(body.text(), "\nnewer entry\nolder entry");
    }

    #[test]
    fn insert_past_end_is_rejected() {
        let mut body = DocumentBody::default();
        assert!(body.insert_horizontal_rule(1).is_err());
        assert!(body.is_empty());
    }

    #[test]
    fn table_text_joins_cells_with_tabs() {
        let mut body = DocumentBody::default();
        let table = Table::from_text_rows(&[
            vec!["Session Notes".to_string(), "Supervision".to_string()],
            vec!["Notes".to_string(), "Reviewed goals".to_string()],
        ]);
        let inserted = must(body.insert_table(0, table));
        assert_eq!(inserted.num_rows(), 2);
        assert_eq!(body.text(), "Session Notes\tSupervision\nNotes\tReviewed goals");
    }
}
