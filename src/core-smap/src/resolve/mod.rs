//! Entry resolution pipeline: fetch, normalize, merge defaults, expand
//! locales, filter, deduplicate.

pub mod batch;
pub mod dedup;
pub mod defaults;
pub mod fetch;
pub mod filter;
pub mod i18n;
pub mod normalize;

pub use dedup::dedupe;
pub use defaults::{DefaultsMerger, MergedEntry, RouteRuleIndex};
pub use fetch::{FetchOutcome, RequestMemo, SourceFetcher};
pub use filter::FilterEngine;
pub use i18n::{Candidate, I18nExpander};
pub use normalize::{NormalizePolicy, NormalizedEntry, normalize_entry};
