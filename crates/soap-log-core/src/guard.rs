//! Duplicate detection by response identifier.

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::resolver::{find_container, resolve_log_document, DocumentLookup};
use crate::storage::DriveStore;
use crate::SoapLogError;

/// Plain substring test; any occurrence of the id counts, wherever it appears.
#[must_use]
pub fn text_contains_response_id(text: &str, response_id: &str) -> bool {
    text.contains(response_id)
}

/// `true` when `response_id` already appears in the client's log document.
///
/// Fails open: if the container, notes folder or log document cannot be
/// resolved, or the store errors, the submission is treated as new. A
/// transient storage error can therefore produce a duplicate note.
#[must_use]
pub fn is_note_in_document<S: DriveStore + ?Sized>(
    store: &S,
    job_code: &str,
    response_id: &str,
    config: &PipelineConfig,
) -> bool {
    match lookup_response_id(store, job_code, response_id, config) {
        Ok(found) => found,
        Err(err) => {
            warn!(job_code, response_id, error = %err, "duplicate check failed; assuming not processed");
            false
        }
    }
}

fn lookup_response_id<S: DriveStore + ?Sized>(
    store: &S,
    job_code: &str,
    response_id: &str,
    config: &PipelineConfig,
) -> Result<bool, SoapLogError> {
    let Some(container) = find_container(store, job_code)? else {
        return Ok(false);
    };
    let Some(folder) = store.find_folder(&container, &config.notes_folder_name)? else {
        return Ok(false);
    };
    let lookup = DocumentLookup::for_job_code(job_code, &config.fallback_document_name);
    let Some(document) = resolve_log_document(store, &lookup.prefix, &folder, &container)? else {
        return Ok(false);
    };

    let text = store.open_document(&document)?.text();
    info!(
        response_id,
        text_len = text.len(),
        "searching log document for response id"
    );
    Ok(text_contains_response_id(&text, response_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ensure_subfolder;
    use crate::test_support::{must, MemoryDrive};

    const LABEL: &str = "John S. (ABA)";

    fn drive_with_log(text: &str) -> MemoryDrive {
        let mut drive = MemoryDrive::default();
        let container = drive.add_container(LABEL);
        let folder = must(ensure_subfolder(
            &mut drive,
            &container,
            "Session Notes (S.O.A.P.)",
        ));
        drive.add_document(&folder, "JS_SOAP_LOG_031524", text);
        drive
    }

    #[test]
    fn substring_match_detects_prior_entry() {
        let drive = drive_with_log("SOAP Note Entry: 3/15/2024 [Response ID: resp-001]");
        let config = PipelineConfig::default();
        assert!(is_note_in_document(&drive, LABEL, "resp-001", &config));
        assert!(!is_note_in_document(&drive, LABEL, "resp-002", &config));
    }

    #[test]
    fn any_occurrence_counts_not_just_marker_tags() {
        let drive = drive_with_log("Notes mention resp-001 in passing");
        assert!(is_note_in_document(
            &drive,
            LABEL,
            "resp-001",
            &PipelineConfig::default()
        ));
    }

    #[test]
    fn unresolvable_targets_fail_open() {
        let config = PipelineConfig::default();

        let empty = MemoryDrive::default();
        assert!(!is_note_in_document(&empty, LABEL, "resp-001", &config));

        let mut no_folder = MemoryDrive::default();
        no_folder.add_container(LABEL);
        assert!(!is_note_in_document(&no_folder, LABEL, "resp-001", &config));
        assert!(no_folder.folders.is_empty(), "guard must not create folders");

        let mut no_document = MemoryDrive::default();
        let container = no_document.add_container(LABEL);
        must(ensure_subfolder(
            &mut no_document,
            &container,
            "Session Notes (S.O.A.P.)",
        ));
        assert!(!is_note_in_document(&no_document, LABEL, "resp-001", &config));
    }

    #[test]
    fn storage_errors_fail_open_even_when_id_is_present() {
        let mut drive = drive_with_log("[Response ID: resp-001]");
        drive.fail_reads = true;
        assert!(!is_note_in_document(
            &drive,
            LABEL,
            "resp-001",
            &PipelineConfig::default()
        ));
    }
}
