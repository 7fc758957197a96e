use std::collections::VecDeque;

///
/// A FIFO queue whose elements keep a stable logical index.
///
/// Elements are numbered in push order starting at zero. Popping from the front
/// never renumbers the remaining elements: logical index `i` names the same
/// element for as long as it is buffered. The merge-join uses this to keep
/// scanning a look-back window of right-hand intervals while evicting the ones
/// that can no longer overlap.
///
/// Push and pop are amortized O(1), random access is O(1).
///
#[derive(Debug, Clone)]
pub struct StreamBuffer<T> {
    items: VecDeque<T>,
    /// logical index of `items[0]`, i.e. how many elements have been popped
    offset: usize,
}

impl<T> Default for StreamBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StreamBuffer<T> {
    pub fn new() -> Self {
        StreamBuffer {
            items: VecDeque::new(),
            offset: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        StreamBuffer {
            items: VecDeque::with_capacity(capacity),
            offset: 0,
        }
    }

    /// Append an element and return its logical index.
    pub fn push_back(&mut self, item: T) -> usize {
        self.items.push_back(item);
        self.offset + self.items.len() - 1
    }

    pub fn pop_front(&mut self) -> Option<T> {
        let item = self.items.pop_front()?;
        self.offset += 1;
        Some(item)
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    ///
    /// Get an element by logical index.
    ///
    /// Returns `None` for indices that were already popped or not pushed yet.
    ///
    pub fn get(&self, index: usize) -> Option<&T> {
        index
            .checked_sub(self.offset)
            .and_then(|local| self.items.get(local))
    }

    /// Logical index of the front element (equal to `end_index` when empty).
    pub fn first_index(&self) -> usize {
        self.offset
    }

    /// One past the logical index of the back element.
    pub fn end_index(&self) -> usize {
        self.offset + self.items.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every buffered element; logical numbering continues where it was.
    pub fn clear(&mut self) {
        self.offset += self.items.len();
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn test_logical_indices_survive_pops() {
        let mut buf = StreamBuffer::new();
        for i in 0..5 {
            assert_eq!(buf.push_back(i * 10), i);
        }
        assert_eq!(buf.pop_front(), Some(0));
        assert_eq!(buf.pop_front(), Some(10));

        assert_eq!(buf.get(0), None);
        assert_eq!(buf.get(1), None);
        assert_eq!(buf.get(2), Some(&20));
        assert_eq!(buf.get(4), Some(&40));
        assert_eq!(buf.get(5), None);
        assert_eq!(buf.first_index(), 2);
        assert_eq!(buf.end_index(), 5);

        assert_eq!(buf.push_back(50), 5);
        assert_eq!(buf.get(5), Some(&50));
        assert_eq!(buf.len(), 4);
    }

    #[rstest]
    fn test_clear_keeps_numbering() {
        let mut buf = StreamBuffer::with_capacity(4);
        buf.push_back('a');
        buf.push_back('b');
        buf.clear();

        assert!(buf.is_empty());
        assert_eq!(buf.first_index(), 2);
        assert_eq!(buf.push_back('c'), 2);
        assert_eq!(buf.front(), Some(&'c'));
    }

    #[rstest]
    fn test_pop_empty() {
        let mut buf: StreamBuffer<u8> = StreamBuffer::default();
        assert_eq!(buf.pop_front(), None);
        assert_eq!(buf.first_index(), 0);
    }

    #[rstest]
    fn test_many_wraparounds() {
        let mut buf = StreamBuffer::with_capacity(2);
        for i in 0..1000usize {
            buf.push_back(i);
            if i % 3 != 0 {
                buf.pop_front();
            }
        }
        let first = buf.first_index();
        for index in first..buf.end_index() {
            assert_eq!(buf.get(index), Some(&index));
        }
    }
}
