/// Fixed-capacity ring of lines with a single write cursor.
///
/// The cursor always points at the oldest slot, so reading from the
/// cursor and wrapping yields lines in write order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingBuffer {
    slots: Vec<Option<String>>,
    cursor: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            cursor: 0,
        }
    }

    /// Rebuild from persisted slots. `None` when the shape does not match.
    pub(crate) fn from_parts(slots: Vec<Option<String>>, cursor: usize) -> Option<Self> {
        if slots.is_empty() || cursor >= slots.len() {
            return None;
        }
        Some(Self { slots, cursor })
    }

    /// Write a line, overwriting the oldest one when full.
    pub fn push(&mut self, line: String) {
        self.slots[self.cursor] = Some(line);
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// Lines oldest first, skipping empty slots.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        let (newer, older) = self.slots.split_at(self.cursor);
        older
            .iter()
            .chain(newer.iter())
            .filter_map(|slot| slot.as_deref())
            .filter(|line| !line.is_empty())
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn slots(&self) -> &[Option<String>] {
        &self.slots
    }

    /// Number of occupied slots.
    pub fn used(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Total bytes held.
    pub fn bytes(&self) -> usize {
        self.slots.iter().flatten().map(String::len).sum()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_fill_in_order() {
        let mut ring = RingBuffer::new(4);
        ring.push("a".into());
        ring.push("b".into());
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(ring.used(), 2);
        assert_eq!(ring.bytes(), 2);
    }

    #[test]
    fn test_wraps_keeping_latest() {
        let mut ring = RingBuffer::new(3);
        for line in ["1", "2", "3", "4", "5"] {
            ring.push(line.into());
        }
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec!["3", "4", "5"]);
        assert_eq!(ring.cursor(), 2);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let mut ring = RingBuffer::new(3);
        ring.push("x".into());
        ring.push(String::new());
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn test_from_parts_validates() {
        assert!(RingBuffer::from_parts(vec![None, None], 2).is_none());
        assert!(RingBuffer::from_parts(vec![], 0).is_none());
        let ring = RingBuffer::from_parts(vec![Some("b".into()), Some("a".into())], 1).unwrap();
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new(2);
        ring.push("a".into());
        ring.clear();
        assert_eq!(ring.used(), 0);
        assert_eq!(ring.cursor(), 0);
    }
}
