// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::InternalValue;
use interval_heap::IntervalHeap as Heap;

/// Boxed fallible iterator over internal values, in internal key order
pub type BoxedIterator<'a> = Box<dyn Iterator<Item = crate::Result<InternalValue>> + Send + 'a>;

#[derive(Eq)]
struct HeapItem(usize, InternalValue);

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.1.key == other.1.key
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.1.key.cmp(&other.1.key)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges multiple sorted KV iterators into one sorted stream
pub struct Merger<'a> {
    iterators: Vec<BoxedIterator<'a>>,
    heap: Heap<HeapItem>,
    initialized: bool,
}

impl<'a> Merger<'a> {
    /// Creates a merger over the given iterators.
    #[must_use]
    pub fn new(iterators: Vec<BoxedIterator<'a>>) -> Self {
        let heap = Heap::with_capacity(iterators.len());

        Self {
            iterators,
            heap,
            initialized: false,
        }
    }

    fn advance(&mut self, idx: usize) -> crate::Result<()> {
        if let Some(iter) = self.iterators.get_mut(idx) {
            if let Some(item) = iter.next() {
                self.heap.push(HeapItem(idx, item?));
            }
        }
        Ok(())
    }

    fn initialize(&mut self) -> crate::Result<()> {
        for idx in 0..self.iterators.len() {
            self.advance(idx)?;
        }
        self.initialized = true;
        Ok(())
    }
}

impl Iterator for Merger<'_> {
    type Item = crate::Result<InternalValue>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.initialized {
            fail_iter!(self.initialize());
        }

        let min_item = self.heap.pop_min()?;
        fail_iter!(self.advance(min_item.0));

        Some(Ok(min_item.1))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ValueType;
    use test_log::test;

    fn boxed(items: Vec<InternalValue>) -> BoxedIterator<'static> {
        Box::new(items.into_iter().map(Ok))
    }

    #[test]
    fn merge_interleaved() -> crate::Result<()> {
        let a = vec![
            InternalValue::from_components("a", "", 1, ValueType::Value),
            InternalValue::from_components("c", "", 1, ValueType::Value),
        ];
        let b = vec![
            InternalValue::from_components("a", "", 5, ValueType::Value),
            InternalValue::from_components("b", "", 2, ValueType::Value),
        ];

        let merged = Merger::new(vec![boxed(a), boxed(b)]).collect::<crate::Result<Vec<_>>>()?;

        let keys = merged
            .iter()
            .map(|x| (x.key.user_key.to_vec(), x.key.seqno))
            .collect::<Vec<_>>();

        assert_eq!(
            vec![
                (b"a".to_vec(), 5),
                (b"a".to_vec(), 1),
                (b"b".to_vec(), 2),
                (b"c".to_vec(), 1),
            ],
            keys
        );

        Ok(())
    }

    #[test]
    fn merge_propagates_error() {
        let failing: BoxedIterator<'static> = Box::new(std::iter::once(Err(crate::Error::Io(
            std::io::Error::other("broken table"),
        ))));

        let mut merger = Merger::new(vec![failing]);
        assert!(matches!(merger.next(), Some(Err(crate::Error::Io(_)))));
    }

    #[test]
    fn merge_empty() {
        let mut merger = Merger::new(vec![]);
        assert!(merger.next().is_none());
    }
}
