//! Min-heap of pending records, one per live source.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::Record;

/// One buffered record together with the index of the source it came from.
pub(crate) struct HeapEntry {
    pub record: Record,
    pub source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.record.ts_nanos == other.record.ts_nanos
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap: entries with equal timestamps pop in an
        // unspecified source order.
        other.record.ts_nanos.cmp(&self.record.ts_nanos)
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Holds at most one pending record per source, ordered by timestamp.
pub(crate) struct PendingHeap {
    entries: BinaryHeap<HeapEntry>,
}

impl PendingHeap {
    pub fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, entry: HeapEntry) {
        self.entries.push(entry);
    }

    pub fn pop_min(&mut self) -> Option<HeapEntry> {
        self.entries.pop()
    }

    /// Timestamp of the earliest pending record, if any.
    pub fn peek_min_ts(&self) -> Option<i64> {
        self.entries.peek().map(|entry| entry.record.ts_nanos)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureMeta;
    use pcap_parser::Linktype;

    fn entry(ts_nanos: i64, source: usize) -> HeapEntry {
        HeapEntry {
            record: Record {
                ts_nanos,
                meta: CaptureMeta {
                    caplen: 1,
                    origlen: 1,
                    link_type: Linktype::ETHERNET,
                },
                data: vec![0],
            },
            source,
        }
    }

    #[test]
    fn pops_in_timestamp_order() {
        let mut heap = PendingHeap::new();
        heap.push(entry(30, 0));
        heap.push(entry(10, 1));
        heap.push(entry(20, 2));

        let order: Vec<i64> = std::iter::from_fn(|| heap.pop_min())
            .map(|e| e.record.ts_nanos)
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
    }

    #[test]
    fn peek_reports_earliest_without_removing() {
        let mut heap = PendingHeap::new();
        assert_eq!(heap.peek_min_ts(), None);

        heap.push(entry(42, 0));
        heap.push(entry(7, 1));
        assert_eq!(heap.peek_min_ts(), Some(7));
        assert_eq!(heap.len(), 2);
    }
}
