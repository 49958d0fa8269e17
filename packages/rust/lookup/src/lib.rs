//! Source-id to knowledge-base-code lookup table.
//!
//! The search API only knows opaque source ids; local documents are named by
//! KB code. The [`LookupTable`] trait bridges the two. Two implementations ship:
//! - [`InMemoryLookup::demo`]: the fixed table used until a real store exists
//! - [`InMemoryLookup::from_json_file`]: the same shape loaded from a JSON array

use std::path::Path;

use kbanswer_shared::{KbAnswerError, KbRecord, Result};

/// Read access to lookup records.
pub trait LookupTable: Send + Sync {
    /// Every record, in table order.
    fn all(&self) -> Vec<KbRecord>;

    /// Records whose `source_id` equals `source_id`, in table order.
    fn by_source_id(&self, source_id: &str) -> Vec<KbRecord> {
        self.all()
            .into_iter()
            .filter(|r| r.source_id == source_id)
            .collect()
    }

    /// Records whose `kb_id` equals `kb_id`, in table order.
    fn by_kb_id(&self, kb_id: &str) -> Vec<KbRecord> {
        self.all().into_iter().filter(|r| r.kb_id == kb_id).collect()
    }
}

// ---------------------------------------------------------------------------
// InMemoryLookup
// ---------------------------------------------------------------------------

/// A lookup table held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLookup {
    records: Vec<KbRecord>,
}

/// `(kb_id, source_id, index_id)` rows of the demo table; ids are assigned 1..
const DEMO_ROWS: &[(&str, &str, &str)] = &[
    ("KB0017882", "78c88ca6-6adb-4b90-ad2e-8c6c2bb8a05a", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
    ("KB0017882", "78c88ca6-6adb-4b90-ad2e-8c6c2bb8a05a", "c3df6a39-0151-4dfa-b49f-53f7bb8e91f8"),
    ("KB0034986", "a7f04be7-d2c2-4de9-8cc8-0e79c2839414", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
    ("KB0034986", "c7539b23-a266-4797-ab0c-7018c739c6ce", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
    ("KB0019150", "a27dc02f-690e-45fb-90b6-1f1ad4429205", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
    ("KB0019150", "542846e4-380a-41b7-b6f9-b190810f2c26", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
    ("KB0033197", "4254bd03-024a-4477-a50f-ee7289b9ee1e", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
    ("KB0033197", "b2cb9057-b837-470d-bd4e-d3cc55428479", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
    ("KB0018415", "4a11c507-9381-4701-bfd2-01844262667a", "0211f006-78fe-4df2-9b48-9471b0cbf70e"),
];

impl InMemoryLookup {
    /// Wrap an explicit list of records.
    pub fn new(records: Vec<KbRecord>) -> Self {
        Self { records }
    }

    /// The built-in demo table.
    pub fn demo() -> Self {
        let records = DEMO_ROWS
            .iter()
            .zip(1u32..)
            .map(|(&(kb_id, source_id, index_id), id)| KbRecord {
                id,
                kb_id: kb_id.into(),
                source_id: source_id.into(),
                index_id: index_id.into(),
            })
            .collect();
        Self { records }
    }

    /// Load records from a JSON array of `{id, kb_id, source_id, index_id}` objects.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| KbAnswerError::io(path, e))?;

        let records: Vec<KbRecord> = serde_json::from_str(&content).map_err(|e| {
            KbAnswerError::Lookup(format!("invalid lookup file {}: {e}", path.display()))
        })?;

        tracing::info!(?path, records = records.len(), "loaded lookup table");
        Ok(Self { records })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl LookupTable for InMemoryLookup {
    fn all(&self) -> Vec<KbRecord> {
        self.records.clone()
    }

    fn by_source_id(&self, source_id: &str) -> Vec<KbRecord> {
        self.records
            .iter()
            .filter(|r| r.source_id == source_id)
            .cloned()
            .collect()
    }
}

/// Open the table at `path`, or the demo table when no path is given.
pub fn open(path: Option<&Path>) -> Result<InMemoryLookup> {
    match path {
        Some(p) => InMemoryLookup::from_json_file(p),
        None => {
            tracing::debug!("no lookup file configured, using demo table");
            Ok(InMemoryLookup::demo())
        }
    }
}
