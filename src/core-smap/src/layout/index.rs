//! Child-sitemap references for the index document.

use chrono::{DateTime, NaiveDate, Utc};
use data_model_smap::config::IndexReference;
use data_model_smap::entry::ResolvedEntry;

use super::{ChunkPlan, Layout};

fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// The latest valid `lastmod` among `entries`, in its original form.
pub fn latest_lastmod(entries: &[ResolvedEntry]) -> Option<String> {
    entries
        .iter()
        .filter_map(|e| {
            let value = e.meta.lastmod.as_deref()?;
            Some((parse_lastmod(value)?, value))
        })
        .max_by_key(|(parsed, _)| *parsed)
        .map(|(_, value)| value.to_string())
}

/// One reference per group (or per chunk of a chunked group) in layout
/// order, then the configured external sitemaps. `resolved[i]` holds the
/// entries of `layout.groups()[i]`.
pub fn build_index(layout: &Layout, resolved: &[Vec<ResolvedEntry>], append: &[IndexReference]) -> Vec<IndexReference> {
    let mut refs = Vec::new();
    for (group, entries) in layout.groups().iter().zip(resolved) {
        let plan = ChunkPlan::plan(group.file_stem.clone(), entries.len(), group.chunk_size);
        if plan.is_chunked() {
            for n in 0..plan.chunk_count {
                let chunk = plan.slice(entries, n).unwrap_or_default();
                refs.push(IndexReference {
                    sitemap: layout.document_path(group, Some(n)),
                    lastmod: latest_lastmod(chunk),
                });
            }
        } else {
            refs.push(IndexReference {
                sitemap: layout.document_path(group, None),
                lastmod: latest_lastmod(entries),
            });
        }
    }
    refs.extend(append.iter().cloned());
    refs
}
