//! Local retrieval step: source id → KB code → `.txt` file on disk.
//!
//! The local directory is the source of truth. The search API only tells us
//! *which* article to read; the full text always comes from the file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use kbanswer_lookup::LookupTable;
use kbanswer_shared::RetrievedDocument;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::state::{Patch, PipelineState, StateUpdate};

static DOC_EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(txt|pdf)$").unwrap());

static KB_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)KB\d+").unwrap());

/// Outcome of a successful read, before it is turned into a state update.
#[derive(Debug, Clone)]
pub struct LocalDocument {
    pub path: PathBuf,
    pub title: String,
    pub content: String,
}

/// `.txt` file names in `docs_dir`, sorted. Empty when the directory is unreadable.
fn list_text_files(docs_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(docs_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(".txt"))
        // Follows symlinks, so linked articles count.
        .filter(|name| docs_dir.join(name).is_file())
        .collect();
    names.sort();
    names
}

/// Find the `.txt` file in `docs_dir` that corresponds to `reference`.
///
/// First by name (the reference with any `.txt`/`.pdf` suffix removed equals,
/// contains, or is contained in the file stem), then by the KB code embedded in
/// the reference, matched case-insensitively against the whole file name.
pub fn find_local_file(reference: &str, docs_dir: &Path) -> Option<PathBuf> {
    let reference = reference.trim();
    if reference.is_empty() || !docs_dir.is_dir() {
        return None;
    }

    let names = list_text_files(docs_dir);
    let base_ref = DOC_EXTENSION.replace(reference, "");

    if !base_ref.is_empty() {
        for name in &names {
            let stem = DOC_EXTENSION.replace(name, "");
            if stem.is_empty() {
                continue;
            }
            if stem == base_ref || stem.contains(&*base_ref) || base_ref.contains(&*stem) {
                debug!(%name, "matched by name");
                return Some(docs_dir.join(name));
            }
        }
    }

    let kb_code = KB_CODE.find(reference)?.as_str().to_uppercase();
    names
        .iter()
        .find(|name| name.to_uppercase().contains(&kb_code))
        .map(|name| {
            debug!(%name, %kb_code, "matched by KB code");
            docs_dir.join(name)
        })
}

/// Read a document, replacing invalid UTF-8 sequences.
pub fn read_document(path: &Path) -> std::io::Result<LocalDocument> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(LocalDocument {
        path: path.to_path_buf(),
        title,
        content,
    })
}

/// Resolve `doc_reference` through the lookup table and load the local article.
///
/// Does nothing when an earlier step already failed. Every failure is stored in
/// `error`; nothing is read from disk unless a KB code was resolved.
#[instrument(skip_all, fields(run_id = %state.run_id, docs_dir = %docs_dir.display()))]
pub fn fetch_local_document(
    state: &PipelineState,
    lookup: &dyn LookupTable,
    docs_dir: &Path,
) -> StateUpdate {
    if state.has_error() {
        debug!("skipping local fetch after earlier failure");
        return StateUpdate::default();
    }

    let Some(source_id) = state.doc_reference.as_deref().filter(|s| !s.is_empty()) else {
        return StateUpdate::failure(
            "no document found for the question: the search returned no source identifier",
        );
    };

    let records = lookup.by_source_id(source_id);
    let Some(record) = records.first() else {
        warn!(%source_id, "source id not in lookup table");
        return StateUpdate::failure(format!("no lookup record found for source_id: {source_id}"));
    };

    let kb_id = record.kb_id.trim();
    if kb_id.is_empty() {
        return StateUpdate::failure(format!("lookup record for {source_id} has an empty kb_id"));
    }
    info!(%source_id, %kb_id, "resolved source id");

    let Some(path) = find_local_file(kb_id, docs_dir) else {
        return StateUpdate::failure(format!(
            "local document not found for KB: {kb_id} (folder: {})",
            docs_dir.display()
        ));
    };

    let document = match read_document(&path) {
        Ok(doc) => doc,
        Err(e) => {
            return StateUpdate::failure(format!(
                "failed to read local file {}: {e}",
                path.display()
            ));
        }
    };

    info!(
        path = %document.path.display(),
        chars = document.content.chars().count(),
        "loaded local document"
    );

    let retrieved = RetrievedDocument {
        kb_id: kb_id.to_string(),
        doc_title: document.title,
        doc_path: document.path.display().to_string(),
        source_id: source_id.to_string(),
        from_document: state.from_document.clone(),
        similarity_score: state.best_similarity_score,
        snippet: state.best_chunks_snippet.clone(),
    };

    StateUpdate {
        raw_text_content: Patch::Set(document.content),
        kb_id: Patch::Set(kb_id.to_string()),
        retrieved_document: Patch::Set(retrieved),
        error: Patch::Clear,
        ..Default::default()
    }
}
