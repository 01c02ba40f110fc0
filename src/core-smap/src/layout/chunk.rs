use std::ops::Range;

/// How one sitemap's entries split into documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub sitemap_name: String,
    pub total_entries: usize,
    /// `None` means unchunked: one document, no `-N` routes.
    pub chunk_size: Option<usize>,
    pub chunk_count: usize,
}

impl ChunkPlan {
    /// Plan chunks for `total_entries` entries. A zero size disables chunking.
    pub fn plan(sitemap_name: impl Into<String>, total_entries: usize, chunk_size: Option<usize>) -> Self {
        let chunk_size = chunk_size.filter(|size| *size > 0);
        let chunk_count = match chunk_size {
            Some(size) => total_entries.div_ceil(size),
            None => 1,
        };
        Self {
            sitemap_name: sitemap_name.into(),
            total_entries,
            chunk_size,
            chunk_count,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.chunk_size.is_some()
    }

    /// Entry range of chunk `n`, `None` when out of range or unchunked.
    pub fn range(&self, n: usize) -> Option<Range<usize>> {
        let size = self.chunk_size?;
        if n >= self.chunk_count {
            return None;
        }
        let start = n * size;
        Some(start..self.total_entries.min(start + size))
    }

    pub fn slice<'a, T>(&self, entries: &'a [T], n: usize) -> Option<&'a [T]> {
        entries.get(self.range(n)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twelve_entries_by_three() {
        let entries: Vec<usize> = (1..=12).collect();
        let plan = ChunkPlan::plan("posts", entries.len(), Some(3));
        assert_eq!(plan.chunk_count, 4);
        assert_eq!(plan.slice(&entries, 0), Some(&[1, 2, 3][..]));
        assert_eq!(plan.slice(&entries, 3), Some(&[10, 11, 12][..]));
        assert_eq!(plan.slice(&entries, 4), None);
    }

    #[test]
    fn test_chunk_coverage() {
        for (total, size) in [(0usize, 3usize), (1, 3), (10, 3), (9, 3), (1001, 1000)] {
            let entries: Vec<usize> = (0..total).collect();
            let plan = ChunkPlan::plan("s", total, Some(size));
            assert_eq!(plan.chunk_count, total.div_ceil(size));

            let mut union = Vec::new();
            for n in 0..plan.chunk_count {
                union.extend_from_slice(plan.slice(&entries, n).unwrap());
            }
            assert_eq!(union, entries);

            if plan.chunk_count > 0 {
                let last = plan.slice(&entries, plan.chunk_count - 1).unwrap();
                assert_eq!(last.len(), total - (plan.chunk_count - 1) * size);
            }
        }
    }

    #[test]
    fn test_unchunked() {
        for size in [None, Some(0)] {
            let plan = ChunkPlan::plan("pages", 5, size);
            assert!(!plan.is_chunked());
            assert_eq!(plan.chunk_count, 1);
            assert_eq!(plan.range(0), None);
        }
    }
}
