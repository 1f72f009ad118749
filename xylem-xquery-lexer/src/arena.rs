/// Stable location of a piece of text copied into a [`TokenArena`].
///
/// Spans stay valid until the arena is reset; release is bulk-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaSpan {
    chunk: u32,
    start: u32,
    len: u32,
}

impl ArenaSpan {
    pub const EMPTY: ArenaSpan = ArenaSpan {
        chunk: 0,
        start: 0,
        len: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

const INITIAL_RESERVE_BYTES: usize = 4096;

/// Append-only chunked storage for token text that cannot be borrowed from
/// the query source (unescaped string literals, attribute template parts).
///
/// Chunks never reallocate once created, so a span handed out by
/// [`TokenArena::write_copy`] resolves to the same bytes for the lifetime of
/// the arena.
#[derive(Debug, Default)]
pub struct TokenArena {
    chunks: Vec<String>,
    total: usize,
    next_capacity: usize,
}

impl TokenArena {
    pub fn new() -> Self {
        TokenArena {
            chunks: Vec::new(),
            total: 0,
            next_capacity: INITIAL_RESERVE_BYTES,
        }
    }

    /// Copies `text` into the arena and returns a span addressing the copy.
    pub fn write_copy(&mut self, text: &str) -> ArenaSpan {
        if text.is_empty() {
            return ArenaSpan::EMPTY;
        }
        self.ensure_capacity(text.len());
        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let start = chunk.len();
        chunk.push_str(text);
        self.total += text.len();
        ArenaSpan {
            chunk: chunk_index as u32,
            start: start as u32,
            len: text.len() as u32,
        }
    }

    /// Resolves a span previously returned by [`TokenArena::write_copy`].
    pub fn resolve(&self, span: ArenaSpan) -> &str {
        if span.len == 0 {
            return "";
        }
        let chunk = &self.chunks[span.chunk as usize];
        &chunk[span.start as usize..(span.start + span.len) as usize]
    }

    /// Drops all stored text. Outstanding spans must not be resolved after
    /// this.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.total = 0;
        self.next_capacity = INITIAL_RESERVE_BYTES;
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn capacity(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.capacity()).sum()
    }

    fn ensure_capacity(&mut self, additional: usize) {
        if let Some(chunk) = self.chunks.last() {
            if chunk.capacity() - chunk.len() >= additional {
                return;
            }
        }
        let mut capacity = self.next_capacity;
        while capacity < additional {
            capacity *= 2;
        }
        self.chunks.push(String::with_capacity(capacity));
        self.next_capacity = capacity * 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_survive_growth() {
        let mut arena = TokenArena::new();
        let first = arena.write_copy("hello");
        // force several chunk allocations
        let big = "x".repeat(10_000);
        let second = arena.write_copy(&big);
        let third = arena.write_copy("world");
        assert_eq!(arena.resolve(first), "hello");
        assert_eq!(arena.resolve(second), big);
        assert_eq!(arena.resolve(third), "world");
    }

    #[test]
    fn empty_write_is_empty_span() {
        let mut arena = TokenArena::new();
        let span = arena.write_copy("");
        assert!(span.is_empty());
        assert_eq!(arena.resolve(span), "");
        assert!(arena.is_empty());
    }

    #[test]
    fn reset_reclaims_storage() {
        let mut arena = TokenArena::new();
        arena.write_copy("abc");
        assert_eq!(arena.len(), 3);
        arena.reset();
        assert_eq!(arena.len(), 0);
        let span = arena.write_copy("def");
        assert_eq!(arena.resolve(span), "def");
    }
}
