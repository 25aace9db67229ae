//! Seams to the hosting document store and response sheet.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::document::DocumentBody;
use crate::sheet::{CellValue, SheetTable};
use crate::SoapLogError;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(ContainerId);
string_id!(FolderId);
string_id!(DocumentId);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: ContainerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerPage {
    pub containers: Vec<ContainerRef>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub id: DocumentId,
    pub name: String,
    pub folder_id: FolderId,
}

/// Name-contains search for documents directly inside one folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentQuery<'a> {
    pub name_contains: &'a str,
    pub folder_id: &'a FolderId,
    pub container_id: &'a ContainerId,
    pub limit: usize,
}

/// Hierarchical document store: containers hold folders, folders hold documents.
pub trait DriveStore {
    /// Lists containers one page at a time; `next_page_token` is `None` on the last page.
    ///
    /// # Errors
    /// Returns [`SoapLogError::Storage`] when the backend call fails.
    fn list_containers(
        &self,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<ContainerPage, SoapLogError>;

    /// Exact, case-sensitive folder name lookup scoped to a container.
    ///
    /// # Errors
    /// Returns [`SoapLogError::Storage`] when the backend call fails.
    fn find_folder(
        &self,
        container_id: &ContainerId,
        name: &str,
    ) -> Result<Option<FolderId>, SoapLogError>;

    /// # Errors
    /// Returns [`SoapLogError::Storage`] when the folder cannot be created.
    fn create_folder(
        &mut self,
        container_id: &ContainerId,
        name: &str,
    ) -> Result<FolderId, SoapLogError>;

    /// Documents whose name contains `query.name_contains`, most recently
    /// modified first, at most `query.limit` of them.
    ///
    /// # Errors
    /// Returns [`SoapLogError::Storage`] when the backend call fails.
    fn query_documents(&self, query: &DocumentQuery<'_>)
        -> Result<Vec<DocumentMeta>, SoapLogError>;

    /// # Errors
    /// Returns [`SoapLogError::Storage`] when the document cannot be created.
    fn create_document(&mut self, folder_id: &FolderId, name: &str)
        -> Result<DocumentId, SoapLogError>;

    /// # Errors
    /// Returns [`SoapLogError::NotFound`] for unknown ids and
    /// [`SoapLogError::Storage`] for backend failures.
    fn open_document(&self, document_id: &DocumentId) -> Result<DocumentBody, SoapLogError>;

    /// Commits an edited body and bumps the document's modification order.
    ///
    /// # Errors
    /// Returns [`SoapLogError::NotFound`] for unknown ids and
    /// [`SoapLogError::Storage`] for backend failures.
    fn save_document(
        &mut self,
        document_id: &DocumentId,
        body: &DocumentBody,
    ) -> Result<(), SoapLogError>;
}

/// Tabular source of form responses.
pub trait ResponseSheet {
    /// # Errors
    /// Returns [`SoapLogError::Storage`] when the backend call fails.
    fn load_sheet(&self, name: &str) -> Result<Option<SheetTable>, SoapLogError>;

    /// Writes one cell. `row_number` is 1-based with the header on row 1;
    /// `column_index` is 0-based.
    ///
    /// # Errors
    /// Returns [`SoapLogError::NotFound`] when the sheet or row does not exist.
    fn set_cell(
        &mut self,
        name: &str,
        row_number: usize,
        column_index: usize,
        value: &CellValue,
    ) -> Result<(), SoapLogError>;
}
