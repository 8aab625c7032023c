use std::fmt::Write as _;

/// Marker into the scratch arena. Rolling back to a marker frees every
/// allocation made after it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchMarker(usize);

/// Handle to a byte range inside the arena. Handles, not references: the
/// backing storage may move when it grows, so spans are resolved through
/// the arena on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchSpan {
    start: usize,
    len: usize,
}

/// Per-worker bump region for short-lived scratch space. The job runner
/// takes a marker before every job body and rolls back after it, so
/// scratch allocations never leak between jobs.
#[derive(Debug, Default)]
pub struct ScratchArena {
    bytes: Vec<u8>,
}

impl ScratchArena {
    pub fn new() -> ScratchArena {
        ScratchArena {
            bytes: Vec::with_capacity(16 * 1024),
        }
    }

    pub fn mark(&self) -> ScratchMarker {
        ScratchMarker(self.bytes.len())
    }

    pub fn rollback_to(&mut self, marker: ScratchMarker) {
        debug_assert!(marker.0 <= self.bytes.len());
        self.bytes.truncate(marker.0);
    }

    /// Drop everything but keep the capacity.
    pub fn reset(&mut self) {
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn alloc_str(&mut self, s: &str) -> ScratchSpan {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(s.as_bytes());
        ScratchSpan {
            start,
            len: s.len(),
        }
    }

    pub fn alloc_fmt(&mut self, args: std::fmt::Arguments<'_>) -> ScratchSpan {
        let start = self.bytes.len();
        let mut writer = ByteWriter(&mut self.bytes);
        // writing to a Vec cannot fail
        let _ = writer.write_fmt(args);
        ScratchSpan {
            start,
            len: self.bytes.len() - start,
        }
    }

    pub fn str_at(&self, span: ScratchSpan) -> &str {
        let slice = &self.bytes[span.start..span.start + span.len];
        // only alloc_str/alloc_fmt produce spans, both write valid UTF-8
        std::str::from_utf8(slice).unwrap_or("")
    }
}

struct ByteWriter<'a>(&'a mut Vec<u8>);

impl std::fmt::Write for ByteWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_frees_later_allocations() {
        let mut arena = ScratchArena::new();
        let a = arena.alloc_str("hello");
        let marker = arena.mark();
        let b = arena.alloc_str("world");
        assert_eq!(arena.str_at(b), "world");

        arena.rollback_to(marker);
        assert_eq!(arena.len(), 5);
        assert_eq!(arena.str_at(a), "hello");
    }

    #[test]
    fn nested_markers_unwind_in_order() {
        let mut arena = ScratchArena::new();
        let outer = arena.mark();
        arena.alloc_str("aa");
        let inner = arena.mark();
        arena.alloc_str("bb");
        arena.rollback_to(inner);
        assert_eq!(arena.len(), 2);
        arena.rollback_to(outer);
        assert!(arena.is_empty());
    }

    #[test]
    fn alloc_fmt_produces_readable_span() {
        let mut arena = ScratchArena::new();
        let span = arena.alloc_fmt(format_args!("{}::{}`{}", "Pkg", "List", 1));
        assert_eq!(arena.str_at(span), "Pkg::List`1");
    }
}
