//! Bounded per-host output ring buffer.
//!
//! Holds the most recent lines of build-agent output for a single host.
//! Appends are O(1) amortized; eviction keeps a running `base_index` so
//! that absolute line numbers stay stable across the window sliding
//! forward, which lets the scroll UI display a consistent position even
//! after old lines have been dropped.

/// Default retained line count per host (see SPEC_FULL §3).
pub const DEFAULT_CAPACITY: usize = 500;

/// A bounded FIFO of output lines with stable absolute indexing.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: std::collections::VecDeque<String>,
    capacity: usize,
    /// Absolute index of `lines[0]`; increments by one for every evicted
    /// line so callers can keep referring to lines by a number that never
    /// gets reused.
    base_index: usize,
}

impl OutputBuffer {
    /// Creates an empty buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty buffer retaining at most `capacity` lines.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: std::collections::VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            base_index: 0,
        }
    }

    /// Appends a line, evicting the oldest line if at capacity.
    pub fn append(&mut self, line: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
            self.base_index += 1;
        }
        self.lines.push_back(line);
    }

    /// Number of lines currently retained.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Absolute index of the oldest retained line (lines evicted before
    /// this index no longer exist).
    pub fn base_index(&self) -> usize {
        self.base_index
    }

    /// Absolute index one past the newest retained line.
    pub fn end_index(&self) -> usize {
        self.base_index + self.lines.len()
    }

    /// Returns up to `count` lines starting at absolute index `from`,
    /// clamped to what is still retained.
    pub fn snapshot(&self, from: usize, count: usize) -> Vec<&str> {
        let from = from.max(self.base_index);
        if from >= self.end_index() {
            return Vec::new();
        }
        let start_offset = from - self.base_index;
        self.lines
            .iter()
            .skip(start_offset)
            .take(count)
            .map(|s| s.as_str())
            .collect()
    }

    /// Returns the last `count` lines (tail view, used by the default
    /// non-scrolled tile rendering).
    pub fn tail(&self, count: usize) -> Vec<&str> {
        let len = self.lines.len();
        let skip = len.saturating_sub(count);
        self.lines.iter().skip(skip).map(|s| s.as_str()).collect()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_visible_immediately() {
        let mut buf = OutputBuffer::with_capacity(4);
        buf.append("one".to_string());
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.tail(1), vec!["one"]);
    }

    #[test]
    fn eviction_keeps_len_at_cap_and_advances_base_index() {
        let mut buf = OutputBuffer::with_capacity(3);
        for i in 0..5 {
            buf.append(format!("line-{i}"));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.base_index(), 2);
        assert_eq!(buf.end_index(), 5);
        assert_eq!(buf.tail(3), vec!["line-2", "line-3", "line-4"]);
    }

    #[test]
    fn snapshot_uses_stable_absolute_indices_across_eviction() {
        let mut buf = OutputBuffer::with_capacity(3);
        for i in 0..5 {
            buf.append(format!("line-{i}"));
        }
        // line-0 and line-1 were evicted; asking for absolute index 0
        // should clamp to the oldest still-retained line.
        assert_eq!(buf.snapshot(0, 10), vec!["line-2", "line-3", "line-4"]);
        assert_eq!(buf.snapshot(3, 1), vec!["line-3"]);
        assert!(buf.snapshot(10, 1).is_empty());
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let mut buf = OutputBuffer::with_capacity(500);
        for i in 0..10_000 {
            buf.append(format!("line-{i}"));
        }
        assert_eq!(buf.len(), 500);
    }

    #[test]
    fn capacity_of_zero_is_clamped_to_one() {
        let mut buf = OutputBuffer::with_capacity(0);
        buf.append("a".to_string());
        buf.append("b".to_string());
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.tail(1), vec!["b"]);
    }
}
