//! Finds (or creates) the container, notes folder and log document for a client.
//!
//! Every lookup here is idempotent. Creation is not guarded against concurrent
//! callers: two triggers racing on the same client can each create a folder or
//! log document.

use time::Date;
use tracing::{info, warn};

use crate::code::{derive_client_code, log_document_name, log_document_prefix, ClientCode};
use crate::config::PipelineConfig;
use crate::decision::{SkipReason, TargetDecision};
use crate::storage::{ContainerId, DocumentId, DocumentQuery, DriveStore, FolderId};
use crate::SoapLogError;

pub const CONTAINER_PAGE_SIZE: usize = 100;
pub const DOCUMENT_QUERY_LIMIT: usize = 50;

/// Search key for a client's log document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLookup {
    pub code: Option<ClientCode>,
    pub prefix: String,
}

impl DocumentLookup {
    /// Uses `{code}_SOAP_LOG_` when a code derives, otherwise the fallback name.
    #[must_use]
    pub fn for_job_code(job_code: &str, fallback_document_name: &str) -> Self {
        let code = derive_client_code(job_code);
        let prefix = code
            .as_ref()
            .map_or_else(|| fallback_document_name.to_string(), log_document_prefix);
        Self { code, prefix }
    }
}

/// Pages through every container looking for an exact name match.
///
/// # Errors
/// Propagates store failures.
pub fn find_container<S: DriveStore + ?Sized>(
    store: &S,
    label: &str,
) -> Result<Option<ContainerId>, SoapLogError> {
    let mut page_token: Option<String> = None;
    loop {
        let page = store.list_containers(page_token.as_deref(), CONTAINER_PAGE_SIZE)?;
        if let Some(found) = page.containers.into_iter().find(|item| item.name == label) {
            return Ok(Some(found.id));
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => return Ok(None),
        }
    }
}

/// Returns the named folder in `container`, creating it when absent.
///
/// # Errors
/// Propagates lookup failures and creation failures.
pub fn ensure_subfolder<S: DriveStore + ?Sized>(
    store: &mut S,
    container: &ContainerId,
    name: &str,
) -> Result<FolderId, SoapLogError> {
    if let Some(existing) = store.find_folder(container, name)? {
        return Ok(existing);
    }
    match store.create_folder(container, name) {
        Ok(created) => {
            info!(folder = name, container = %container, "created notes folder");
            Ok(created)
        }
        Err(err) => {
            warn!(folder = name, container = %container, error = %err, "failed to create notes folder");
            Err(err)
        }
    }
}

/// Picks the log document for `prefix` inside `folder`.
///
/// Candidates are name-contains matches, newest first. A name that truly
/// starts with `prefix` wins over a newer document that merely contains it.
///
/// # Errors
/// Propagates store failures.
pub fn resolve_log_document<S: DriveStore + ?Sized>(
    store: &S,
    prefix: &str,
    folder: &FolderId,
    container: &ContainerId,
) -> Result<Option<DocumentId>, SoapLogError> {
    let candidates = store.query_documents(&DocumentQuery {
        name_contains: prefix,
        folder_id: folder,
        container_id: container,
        limit: DOCUMENT_QUERY_LIMIT,
    })?;

    let index = candidates
        .iter()
        .position(|doc| doc.name.starts_with(prefix))
        .unwrap_or(0);
    Ok(candidates.into_iter().nth(index).map(|doc| doc.id))
}

/// Creates `{code}_SOAP_LOG_{MMDDYY}` in `folder`, using `XX` when no code derives.
///
/// # Errors
/// Propagates the creation failure; callers abort the write.
pub fn create_log_document<S: DriveStore + ?Sized>(
    store: &mut S,
    job_code: &str,
    folder: &FolderId,
    today: Date,
) -> Result<DocumentId, SoapLogError> {
    let code = derive_client_code(job_code);
    let name = log_document_name(code.as_ref(), today);
    match store.create_document(folder, &name) {
        Ok(document) => {
            info!(document = %document, name = %name, "created new SOAP log");
            Ok(document)
        }
        Err(err) => {
            warn!(name = %name, error = %err, "failed to create SOAP log document");
            Err(err)
        }
    }
}

/// Decides where a note for `job_code` goes, without creating the log itself.
///
/// The notes folder is ensured as a side effect. When nothing matches and no
/// code can be derived the decision is a skip: a note is never filed under a
/// generically named document.
///
/// # Errors
/// Propagates store failures.
pub fn plan_target<S: DriveStore + ?Sized>(
    store: &mut S,
    job_code: &str,
    config: &PipelineConfig,
    today: Date,
) -> Result<TargetDecision, SoapLogError> {
    let Some(container) = find_container(store, job_code)? else {
        warn!(job_code, "container not found");
        return Ok(TargetDecision::Skip(SkipReason::ContainerNotFound {
            job_code: job_code.to_string(),
        }));
    };

    let folder = ensure_subfolder(store, &container, &config.notes_folder_name)?;
    let lookup = DocumentLookup::for_job_code(job_code, &config.fallback_document_name);
    info!(job_code, prefix = %lookup.prefix, "looking for log document");

    if let Some(document) = resolve_log_document(store, &lookup.prefix, &folder, &container)? {
        return Ok(TargetDecision::Append {
            container,
            folder,
            document,
        });
    }

    match lookup.code {
        Some(code) => {
            let name = log_document_name(Some(&code), today);
            Ok(TargetDecision::Create {
                container,
                folder,
                code,
                name,
            })
        }
        None => {
            warn!(job_code, "no matching log and no code derived; aborting to avoid misfile");
            Ok(TargetDecision::Skip(SkipReason::NoDerivableCode {
                job_code: job_code.to_string(),
            }))
        }
    }
}
