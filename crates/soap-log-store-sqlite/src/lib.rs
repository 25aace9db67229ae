#![allow(clippy::missing_errors_doc)]

//! SQLite-backed drive and response sheet.
//!
//! Containers, folders and documents mirror a hierarchical file store; sheets
//! hold form responses with spreadsheet row numbering (header on row 1).

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{Map, Value};
use soap_log_core::{
    format_rfc3339, CellValue, ContainerId, ContainerPage, ContainerRef, DocumentBody, DocumentId,
    DocumentMeta, DocumentQuery, DriveStore, FolderId, ResponseSheet, SheetTable, SoapLogError,
};
use time::OffsetDateTime;
use tracing::{debug, info};
use ulid::Ulid;

const SOAP_LOG_MIGRATION_VERSION: i64 = 1;

const SCHEMA_SOAP_LOG_V1: &str = r"
CREATE TABLE IF NOT EXISTS containers (
  container_id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_containers_name ON containers(name);

CREATE TABLE IF NOT EXISTS folders (
  folder_id TEXT PRIMARY KEY,
  container_id TEXT NOT NULL,
  name TEXT NOT NULL,
  created_at TEXT NOT NULL,
  FOREIGN KEY (container_id) REFERENCES containers(container_id)
);

CREATE INDEX IF NOT EXISTS idx_folders_container_name ON folders(container_id, name);

CREATE TABLE IF NOT EXISTS documents (
  document_id TEXT PRIMARY KEY,
  folder_id TEXT NOT NULL,
  name TEXT NOT NULL,
  body_json TEXT NOT NULL,
  modified_seq INTEGER NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  FOREIGN KEY (folder_id) REFERENCES folders(folder_id)
);

CREATE INDEX IF NOT EXISTS idx_documents_folder_seq ON documents(folder_id, modified_seq DESC);

CREATE TABLE IF NOT EXISTS sheets (
  sheet_name TEXT PRIMARY KEY,
  headers_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sheet_rows (
  sheet_name TEXT NOT NULL,
  row_number INTEGER NOT NULL CHECK (row_number >= 2),
  cells_json TEXT NOT NULL,
  PRIMARY KEY (sheet_name, row_number),
  FOREIGN KEY (sheet_name) REFERENCES sheets(sheet_name)
);
";

pub struct SqliteSoapStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub name: String,
    pub modified_seq: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FolderTree {
    pub id: FolderId,
    pub name: String,
    pub documents: Vec<DocumentSummary>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContainerTree {
    pub id: ContainerId,
    pub name: String,
    pub folders: Vec<FolderTree>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppendedRow {
    pub sheet: String,
    pub row_number: usize,
    pub added_headers: Vec<String>,
}

impl SqliteSoapStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )
            .context("failed to ensure schema_migrations exists")?;

        self.conn
            .execute_batch(SCHEMA_SOAP_LOG_V1)
            .context("failed to apply soap log schema")?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![SOAP_LOG_MIGRATION_VERSION, now_rfc3339()?],
            )
            .context("failed to register soap log schema migration")?;

        Ok(())
    }

    /// Adds a client container. Names are not unique; lookups take the first
    /// match in id order.
    pub fn add_container(&self, name: &str) -> Result<ContainerRef> {
        if name.trim().is_empty() {
            return Err(anyhow!("container name MUST be non-empty"));
        }
        let id = ContainerId(Ulid::new().to_string());
        self.conn
            .execute(
                "INSERT INTO containers(container_id, name, created_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), name, now_rfc3339()?],
            )
            .with_context(|| format!("failed to insert container {name}"))?;
        info!(container = %id, name, "added container");
        Ok(ContainerRef {
            id,
            name: name.to_string(),
        })
    }

    /// Every container with its folders and their documents, newest first.
    pub fn list_tree(&self) -> Result<Vec<ContainerTree>> {
        let mut containers = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT container_id, name FROM containers ORDER BY name ASC, container_id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for (id, name) in collect_rows(rows)? {
            let folders = self.folder_trees(&ContainerId(id.clone()))?;
            containers.push(ContainerTree {
                id: ContainerId(id),
                name,
                folders,
            });
        }
        Ok(containers)
    }

    pub fn document_meta(&self, document_id: &DocumentId) -> Result<Option<DocumentMeta>> {
        self.conn
            .query_row(
                "SELECT document_id, name, folder_id FROM documents WHERE document_id = ?1",
                params![document_id.as_str()],
                parse_document_meta,
            )
            .optional()
            .context("failed to look up document")
    }

    /// Most recently modified document with exactly `name`.
    pub fn find_document_by_name(&self, name: &str) -> Result<Option<DocumentMeta>> {
        self.conn
            .query_row(
                "SELECT document_id, name, folder_id FROM documents
                 WHERE name = ?1
                 ORDER BY modified_seq DESC
                 LIMIT 1",
                params![name],
                parse_document_meta,
            )
            .optional()
            .context("failed to look up document by name")
    }

    pub fn read_document(&self, document_id: &DocumentId) -> Result<Option<DocumentBody>> {
        let body_json: Option<String> = self
            .conn
            .query_row(
                "SELECT body_json FROM documents WHERE document_id = ?1",
                params![document_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read document body")?;
        body_json
            .map(|raw| {
                serde_json::from_str(&raw).with_context(|| {
                    format!("invalid stored body JSON for document {document_id}")
                })
            })
            .transpose()
    }

    /// Creates the sheet when absent and appends any headers it lacks.
    /// Returns the headers that were added.
    pub fn ensure_sheet(&self, name: &str, headers: &[String]) -> Result<Vec<String>> {
        if name.trim().is_empty() {
            return Err(anyhow!("sheet name MUST be non-empty"));
        }
        let existing = self.sheet_headers(name)?;
        let existed = existing.is_some();
        let mut current = existing.unwrap_or_default();

        let mut added = Vec::new();
        for header in headers {
            if !current.contains(header) {
                current.push(header.clone());
                added.push(header.clone());
            }
        }

        let headers_json = serde_json::to_string(&current).context("failed to encode headers")?;
        if existed {
            if !added.is_empty() {
                self.conn
                    .execute(
                        "UPDATE sheets SET headers_json = ?2 WHERE sheet_name = ?1",
                        params![name, headers_json],
                    )
                    .context("failed to extend sheet headers")?;
                info!(sheet = name, added = %added.join(", "), "extended sheet headers");
            }
        } else {
            self.conn
                .execute(
                    "INSERT INTO sheets(sheet_name, headers_json, created_at) VALUES (?1, ?2, ?3)",
                    params![name, headers_json, now_rfc3339()?],
                )
                .with_context(|| format!("failed to create sheet {name}"))?;
            info!(sheet = name, "created sheet");
        }
        Ok(added)
    }

    /// Appends one response. Keys become headers in first-seen order; values
    /// map onto cells through [`CellValue::from_json`].
    pub fn append_response(&self, sheet: &str, response: &Map<String, Value>) -> Result<AppendedRow> {
        let keys: Vec<String> = response.keys().cloned().collect();
        let added_headers = self.ensure_sheet(sheet, &keys)?;
        let headers = self
            .sheet_headers(sheet)?
            .ok_or_else(|| anyhow!("sheet {sheet} vanished during append"))?;

        let cells: Vec<CellValue> = headers
            .iter()
            .map(|header| response.get(header).map_or(CellValue::Empty, CellValue::from_json))
            .collect();
        let cells_json = serde_json::to_string(&cells).context("failed to encode row cells")?;

        let next_row: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(row_number), 1) + 1 FROM sheet_rows WHERE sheet_name = ?1",
                params![sheet],
                |row| row.get(0),
            )
            .context("failed to compute next row number")?;
        self.conn
            .execute(
                "INSERT INTO sheet_rows(sheet_name, row_number, cells_json) VALUES (?1, ?2, ?3)",
                params![sheet, next_row, cells_json],
            )
            .context("failed to append response row")?;

        let row_number = usize::try_from(next_row)
            .with_context(|| format!("invalid row number: {next_row}"))?;
        info!(sheet, row_number, "appended response");
        Ok(AppendedRow {
            sheet: sheet.to_string(),
            row_number,
            added_headers,
        })
    }

    pub fn read_sheet(&self, name: &str) -> Result<Option<SheetTable>> {
        let Some(headers) = self.sheet_headers(name)? else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT row_number, cells_json FROM sheet_rows
             WHERE sheet_name = ?1
             ORDER BY row_number ASC",
        )?;
        let rows = stmt.query_map(params![name], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut table = SheetTable {
            name: name.to_string(),
            headers,
            rows: Vec::new(),
        };
        for (row_number, cells_json) in collect_rows(rows)? {
            let row_index = usize::try_from(row_number)
                .ok()
                .and_then(SheetTable::row_index)
                .ok_or_else(|| anyhow!("invalid stored row number: {row_number}"))?;
            let cells: Vec<CellValue> = serde_json::from_str(&cells_json)
                .with_context(|| format!("invalid stored cells for row {row_number}"))?;
            if table.rows.len() < row_index {
                table.rows.resize(row_index, Vec::new());
            }
            table.rows.push(cells);
        }
        Ok(Some(table))
    }

    /// Returns `false` when the row does not exist.
    fn write_cell(
        &self,
        sheet: &str,
        row_number: usize,
        column_index: usize,
        value: &CellValue,
    ) -> Result<bool> {
        let row_key = i64::try_from(row_number)
            .with_context(|| format!("row number out of range: {row_number}"))?;
        let cells_json: Option<String> = self
            .conn
            .query_row(
                "SELECT cells_json FROM sheet_rows WHERE sheet_name = ?1 AND row_number = ?2",
                params![sheet, row_key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read sheet row")?;
        let Some(cells_json) = cells_json else {
            return Ok(false);
        };

        let mut cells: Vec<CellValue> = serde_json::from_str(&cells_json)
            .with_context(|| format!("invalid stored cells for row {row_number}"))?;
        if cells.len() <= column_index {
            cells.resize(column_index + 1, CellValue::Empty);
        }
        cells[column_index] = value.clone();

        self.conn
            .execute(
                "UPDATE sheet_rows SET cells_json = ?3 WHERE sheet_name = ?1 AND row_number = ?2",
                params![
                    sheet,
                    row_key,
                    serde_json::to_string(&cells).context("failed to encode row cells")?
                ],
            )
            .context("failed to update sheet cell")?;
        debug!(sheet, row_number, column_index, "updated sheet cell");
        Ok(true)
    }

    fn sheet_headers(&self, name: &str) -> Result<Option<Vec<String>>> {
        let headers_json: Option<String> = self
            .conn
            .query_row(
                "SELECT headers_json FROM sheets WHERE sheet_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read sheet headers")?;
        headers_json
            .map(|raw| {
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid stored headers for sheet {name}"))
            })
            .transpose()
    }

    fn folder_trees(&self, container_id: &ContainerId) -> Result<Vec<FolderTree>> {
        let mut stmt = self.conn.prepare(
            "SELECT folder_id, name FROM folders
             WHERE container_id = ?1
             ORDER BY name ASC, folder_id ASC",
        )?;
        let rows = stmt.query_map(params![container_id.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut folders = Vec::new();
        for (id, name) in collect_rows(rows)? {
            let mut doc_stmt = self.conn.prepare(
                "SELECT document_id, name, modified_seq, updated_at FROM documents
                 WHERE folder_id = ?1
                 ORDER BY modified_seq DESC",
            )?;
            let docs = doc_stmt.query_map(params![id], |row| {
                Ok(DocumentSummary {
                    id: DocumentId(row.get(0)?),
                    name: row.get(1)?,
                    modified_seq: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            })?;
            folders.push(FolderTree {
                id: FolderId(id),
                name,
                documents: collect_rows(docs)?,
            });
        }
        Ok(folders)
    }

    fn containers_page(&self, page_token: Option<&str>, page_size: usize) -> Result<ContainerPage> {
        if page_size == 0 {
            return Err(anyhow!("page_size MUST be >= 1"));
        }
        let limit = i64::try_from(page_size).unwrap_or(i64::MAX - 1) + 1;
        let mut stmt = self.conn.prepare(
            "SELECT container_id, name FROM containers
             WHERE container_id > ?1
             ORDER BY container_id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![page_token.unwrap_or(""), limit], |row| {
            Ok(ContainerRef {
                id: ContainerId(row.get(0)?),
                name: row.get(1)?,
            })
        })?;

        let mut containers = collect_rows(rows)?;
        let next_page_token = if containers.len() > page_size {
            containers.truncate(page_size);
            containers.last().map(|item| item.id.to_string())
        } else {
            None
        };
        Ok(ContainerPage {
            containers,
            next_page_token,
        })
    }

    fn folder_named(&self, container_id: &ContainerId, name: &str) -> Result<Option<FolderId>> {
        self.conn
            .query_row(
                "SELECT folder_id FROM folders
                 WHERE container_id = ?1 AND name = ?2
                 ORDER BY folder_id ASC
                 LIMIT 1",
                params![container_id.as_str(), name],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("failed to look up folder")
            .map(|found| found.map(FolderId))
    }

    fn insert_folder(&self, container_id: &ContainerId, name: &str) -> Result<FolderId> {
        let id = FolderId(Ulid::new().to_string());
        self.conn
            .execute(
                "INSERT INTO folders(folder_id, container_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), container_id.as_str(), name, now_rfc3339()?],
            )
            .with_context(|| format!("failed to create folder {name} in {container_id}"))?;
        Ok(id)
    }

    fn search_documents(&self, query: &DocumentQuery<'_>) -> Result<Vec<DocumentMeta>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        // instr() keeps `_` and `%` in names literal, unlike LIKE.
        let mut stmt = self.conn.prepare(
            "SELECT d.document_id, d.name, d.folder_id FROM documents d
             JOIN folders f ON f.folder_id = d.folder_id
             WHERE d.folder_id = ?1
               AND f.container_id = ?2
               AND instr(d.name, ?3) > 0
             ORDER BY d.modified_seq DESC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![
                query.folder_id.as_str(),
                query.container_id.as_str(),
                query.name_contains,
                limit
            ],
            parse_document_meta,
        )?;
        collect_rows(rows)
    }

    fn insert_document(&self, folder_id: &FolderId, name: &str) -> Result<DocumentId> {
        let id = DocumentId(Ulid::new().to_string());
        let body_json = serde_json::to_string(&DocumentBody::default())
            .context("failed to encode empty document body")?;
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "INSERT INTO documents(document_id, folder_id, name, body_json, modified_seq, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(modified_seq), 0) + 1 FROM documents), ?5, ?5)",
                params![id.as_str(), folder_id.as_str(), name, body_json, now],
            )
            .with_context(|| format!("failed to create document {name}"))?;
        Ok(id)
    }

    /// Returns `false` when the document does not exist.
    fn update_document(&self, document_id: &DocumentId, body: &DocumentBody) -> Result<bool> {
        let body_json = serde_json::to_string(body).context("failed to encode document body")?;
        let changed = self
            .conn
            .execute(
                "UPDATE documents
                 SET body_json = ?2,
                     modified_seq = (SELECT COALESCE(MAX(modified_seq), 0) + 1 FROM documents),
                     updated_at = ?3
                 WHERE document_id = ?1",
                params![document_id.as_str(), body_json, now_rfc3339()?],
            )
            .context("failed to save document")?;
        Ok(changed > 0)
    }

    #[cfg(test)]
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DriveStore for SqliteSoapStore {
    fn list_containers(
        &self,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<ContainerPage, SoapLogError> {
        self.containers_page(page_token, page_size)
            .map_err(storage_error)
    }

    fn find_folder(
        &self,
        container_id: &ContainerId,
        name: &str,
    ) -> Result<Option<FolderId>, SoapLogError> {
        self.folder_named(container_id, name).map_err(storage_error)
    }

    fn create_folder(
        &mut self,
        container_id: &ContainerId,
        name: &str,
    ) -> Result<FolderId, SoapLogError> {
        self.insert_folder(container_id, name).map_err(storage_error)
    }

    fn query_documents(&self, query: &DocumentQuery<'_>) -> Result<Vec<DocumentMeta>, SoapLogError> {
        self.search_documents(query).map_err(storage_error)
    }

    fn create_document(
        &mut self,
        folder_id: &FolderId,
        name: &str,
    ) -> Result<DocumentId, SoapLogError> {
        self.insert_document(folder_id, name).map_err(storage_error)
    }

    fn open_document(&self, document_id: &DocumentId) -> Result<DocumentBody, SoapLogError> {
        self.read_document(document_id)
            .map_err(storage_error)?
            .ok_or_else(|| SoapLogError::NotFound(format!("document {document_id}")))
    }

    fn save_document(
        &mut self,
        document_id: &DocumentId,
        body: &DocumentBody,
    ) -> Result<(), SoapLogError> {
        let saved = self
            .update_document(document_id, body)
            .map_err(storage_error)?;
        if !saved {
            return Err(SoapLogError::NotFound(format!("document {document_id}")));
        }
        Ok(())
    }
}

impl ResponseSheet for SqliteSoapStore {
    fn load_sheet(&self, name: &str) -> Result<Option<SheetTable>, SoapLogError> {
        self.read_sheet(name).map_err(storage_error)
    }

    fn set_cell(
        &mut self,
        name: &str,
        row_number: usize,
        column_index: usize,
        value: &CellValue,
    ) -> Result<(), SoapLogError> {
        if self.sheet_headers(name).map_err(storage_error)?.is_none() {
            return Err(SoapLogError::NotFound(format!("sheet {name}")));
        }
        let written = self
            .write_cell(name, row_number, column_index, value)
            .map_err(storage_error)?;
        if !written {
            return Err(SoapLogError::NotFound(format!(
                "row {row_number} in sheet {name}"
            )));
        }
        Ok(())
    }
}

#[allow(clippy::needless_pass_by_value)]
fn storage_error(err: anyhow::Error) -> SoapLogError {
    SoapLogError::Storage(format!("{err:#}"))
}

fn now_rfc3339() -> Result<String> {
    format_rfc3339(OffsetDateTime::now_utc()).map_err(|err| anyhow!(err.to_string()))
}

fn parse_document_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentMeta> {
    Ok(DocumentMeta {
        id: DocumentId(row.get(0)?),
        name: row.get(1)?,
        folder_id: FolderId(row.get(2)?),
    })
}

fn collect_rows<T>(
    rows: rusqlite::MappedRows<'_, impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    for row in rows {
        values.push(row?);
    }
    Ok(values)
}
