use std::collections::VecDeque;

use orgmind_common::Record;

/// Pending records for the current run, drained from the front in fixed-size slices.
#[derive(Debug, Default)]
pub struct RecordQueue {
    pending: VecDeque<Record>,
}

impl RecordQueue {
    pub fn load(&mut self, records: Vec<Record>) {
        self.pending = records.into();
    }

    /// Pop up to `size` records. The records are consumed whatever happens to the batch.
    pub fn take_batch(&mut self, size: usize) -> Vec<Record> {
        let n = size.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::new(format!("r{i}"), "body")).collect()
    }

    #[test]
    fn drains_in_order_with_short_tail() {
        let mut queue = RecordQueue::default();
        queue.load(records(23));

        let sizes: Vec<usize> = std::iter::from_fn(|| {
            let batch = queue.take_batch(10);
            (!batch.is_empty()).then_some(batch.len())
        })
        .collect();

        assert_eq!(sizes, vec![10, 10, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn slices_preserve_stream_position() {
        let mut queue = RecordQueue::default();
        queue.load(records(5));
        let first = queue.take_batch(2);
        let second = queue.take_batch(2);
        assert_eq!(first[0].source_id, "r0");
        assert_eq!(second[0].source_id, "r2");
        assert_eq!(queue.len(), 1);
    }
}
