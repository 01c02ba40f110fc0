//! Key-based deduplication with first-position, last-metadata-wins semantics.

use std::collections::HashMap;

use data_model_smap::entry::ResolvedEntry;

/// Collapse entries sharing a `key`. The surviving entry keeps the position
/// of the first occurrence; later occurrences overlay their metadata field by
/// field, and replace the alternates when they carry any.
pub fn dedupe(entries: Vec<ResolvedEntry>) -> Vec<ResolvedEntry> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(entries.len());
    let mut out: Vec<ResolvedEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        match positions.get(&entry.key) {
            Some(&index) => {
                tracing::trace!(key = %entry.key, "merging duplicate entry");
                let existing = &mut out[index];
                existing.meta.overlay(&entry.meta);
                if !entry.alternates.is_empty() {
                    existing.alternates = entry.alternates;
                }
                if entry.sitemap.is_some() {
                    existing.sitemap = entry.sitemap;
                }
            }
            None => {
                positions.insert(entry.key.clone(), out.len());
                out.push(entry);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_model_smap::entry::{Alternate, ChangeFreq, EntryMeta, ParsedLoc};

    fn entry(key: &str, meta: EntryMeta) -> ResolvedEntry {
        ResolvedEntry {
            loc: key.to_string(),
            key: key.to_string(),
            path: ParsedLoc {
                pathname: key.to_string(),
                ..Default::default()
            },
            canonical_path: key.to_string(),
            meta,
            alternates: Vec::new(),
            locale: None,
            sitemap: None,
        }
    }

    #[test]
    fn test_duplicate_bare_entries_collapse() {
        let out = dedupe(vec![entry("/foo", EntryMeta::default()), entry("/foo", EntryMeta::default())]);
        assert_eq!(out.len(), 1);
        assert!(out[0].loc.ends_with("/foo"));
    }

    #[test]
    fn test_position_of_first_metadata_of_last() {
        let first = entry(
            "/a",
            EntryMeta {
                changefreq: Some(ChangeFreq::Weekly),
                priority: Some(0.2),
                ..Default::default()
            },
        );
        let later = entry(
            "/a",
            EntryMeta {
                priority: Some(0.9),
                ..Default::default()
            },
        );
        let out = dedupe(vec![first, entry("/b", EntryMeta::default()), later]);

        let keys: Vec<&str> = out.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/a", "/b"]);
        assert_eq!(out[0].meta.priority, Some(0.9));
        assert_eq!(out[0].meta.changefreq, Some(ChangeFreq::Weekly));
    }

    #[test]
    fn test_later_alternates_replace_only_when_present() {
        let mut first = entry("en:/a", EntryMeta::default());
        first.alternates = vec![Alternate::new("en", "/a")];
        let out = dedupe(vec![first.clone(), entry("en:/a", EntryMeta::default())]);
        assert_eq!(out[0].alternates, first.alternates);

        let mut later = entry("en:/a", EntryMeta::default());
        later.alternates = vec![Alternate::new("x-default", "/a"), Alternate::new("en", "/a")];
        let out = dedupe(vec![first, later.clone()]);
        assert_eq!(out[0].alternates, later.alternates);
    }

    #[test]
    fn test_keys_unique_after_dedupe() {
        let input: Vec<ResolvedEntry> = ["/a", "/b", "/a", "/c", "/b", "/a"]
            .iter()
            .map(|k| entry(k, EntryMeta::default()))
            .collect();
        let out = dedupe(input);
        let mut keys: Vec<&str> = out.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/a", "/b", "/c"]);
        keys.dedup();
        assert_eq!(keys.len(), out.len());
    }
}
