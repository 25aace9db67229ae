//! Core domain logic for transcribing form responses into per-client SOAP logs.
//!
//! The crate is storage-agnostic: containers, folders, documents and response
//! sheets are reached through the [`DriveStore`] and [`ResponseSheet`] traits,
//! and everything else (code derivation, rendering, duplicate detection, row
//! selection, orchestration) is deterministic given a store and a clock value.

pub mod code;
pub mod config;
pub mod date;
pub mod decision;
pub mod document;
pub mod guard;
pub mod note_type;
pub mod pipeline;
pub mod render;
pub mod resolver;
pub mod selector;
pub mod sheet;
pub mod storage;

pub use code::{derive_client_code, log_document_name, log_document_prefix, ClientCode};
pub use config::PipelineConfig;
pub use date::{
    format_entry_timestamp, format_rfc3339, format_session_date, now_in_offset, parse_offset,
    parse_rfc3339, parse_sheet_datetime,
};
pub use decision::{RowDecision, SkipReason, TargetDecision};
pub use document::{CellStyle, DocumentBody, Element, Paragraph, Table, TableCell, TableRow};
pub use guard::{is_note_in_document, text_contains_response_id};
pub use note_type::NoteType;
pub use pipeline::{
    BatchReport, Pipeline, RowOutcome, Trigger, TriggerOutcome, TriggerReport, WrittenNote,
};
pub use render::{NoteRow, RenderOptions};
pub use selector::{ColumnMap, Field, Submission};
pub use sheet::{CellValue, SheetTable};
pub use storage::{
    ContainerId, ContainerPage, ContainerRef, DocumentId, DocumentMeta, DocumentQuery, DriveStore,
    FolderId, ResponseSheet,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum SoapLogError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
}
