//! Merging parser outputs into one unique, attributed catalog.
//!
//! Entries are grouped by normalized URL. Merging is lossless by design:
//! all distinct descriptions are kept and joined rather than ranked, because
//! preference heuristics between sources proved unmaintainable. Output
//! order is the first-seen order of each URL group, which keeps catalogs
//! (and therefore content hashes and embedding matrices) stable across runs
//! when the inputs are unchanged.

use std::collections::HashMap;

use tracing::debug;

use crate::models::{Catalog, ServerEntry};
use crate::schema::CURRENT_SCHEMA_VERSION;

/// Separator between merged descriptions.
const DESCRIPTION_SEPARATOR: &str = "; ";

/// Separator between merged source labels.
const SOURCE_SEPARATOR: &str = "+";

/// Dedup key: case-insensitive, trailing-slash-insensitive.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

struct MergeSlot {
    name: String,
    url: String,
    category: String,
    descriptions: Vec<String>,
    sources: Vec<String>,
}

impl MergeSlot {
    fn absorb(&mut self, entry: ServerEntry) {
        let description = entry.description.trim().to_string();
        if !description.is_empty() && !self.descriptions.contains(&description) {
            self.descriptions.push(description);
        }
        if !self.sources.contains(&entry.source) {
            self.sources.push(entry.source);
        }
        if self.category.is_empty() && !entry.category.is_empty() {
            self.category = entry.category;
        }
    }

    fn finish(self) -> ServerEntry {
        ServerEntry {
            name: self.name,
            description: self.descriptions.join(DESCRIPTION_SEPARATOR),
            url: self.url,
            category: self.category,
            source: self.sources.join(SOURCE_SEPARATOR),
        }
    }
}

/// Merge raw entries from all sources into a unique list.
///
/// Within a URL group the merged entry keeps the first-seen name and URL
/// spelling, the first non-empty category, the ordered union of distinct
/// descriptions, and the ordered union of source labels.
pub fn deduplicate(raw: Vec<ServerEntry>) -> Vec<ServerEntry> {
    let raw_count = raw.len();
    let mut order: Vec<MergeSlot> = Vec::new();
    let mut index_by_url: HashMap<String, usize> = HashMap::new();

    for entry in raw {
        let key = normalize_url(&entry.url);
        match index_by_url.get(&key) {
            Some(&i) => order[i].absorb(entry),
            None => {
                index_by_url.insert(key, order.len());
                let mut slot = MergeSlot {
                    name: entry.name.clone(),
                    url: entry.url.clone(),
                    category: String::new(),
                    descriptions: Vec::new(),
                    sources: Vec::new(),
                };
                slot.absorb(entry);
                order.push(slot);
            }
        }
    }

    let merged: Vec<ServerEntry> = order.into_iter().map(MergeSlot::finish).collect();
    debug!(
        raw = raw_count,
        unique = merged.len(),
        "deduplicated source entries"
    );
    merged
}

/// Build the cycle's catalog from the concatenated parser outputs.
pub fn aggregate(raw: Vec<ServerEntry>) -> Catalog {
    Catalog::new(deduplicate(raw), CURRENT_SCHEMA_VERSION)
}
