//! Fixed-size batching of a fallible record stream.

use crate::error::{LoadError, Result};

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// An ordered group of records dispatched together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    /// 1-based position of this batch in the job.
    pub seq: u64,
    pub records: Vec<T>,
}

impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Groups a record stream into batches of `size`, preserving order.
///
/// The final batch may be shorter. A source error ends the sequence; the
/// records read before it are still yielded as a short batch, then the error.
pub struct Batcher<I> {
    records: I,
    size: usize,
    next_seq: u64,
    done: bool,
    deferred: Option<LoadError>,
}

impl<I, T> Batcher<I>
where
    I: Iterator<Item = Result<T>>,
{
    pub fn new(records: I, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(LoadError::invalid_config(
                "batch_size",
                "must be a positive integer",
            ));
        }
        Ok(Self {
            records,
            size,
            next_seq: 1,
            done: false,
            deferred: None,
        })
    }
}

impl<I, T> Iterator for Batcher<I>
where
    I: Iterator<Item = Result<T>>,
{
    type Item = Result<Batch<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.deferred.take() {
            return Some(Err(e));
        }
        if self.done {
            return None;
        }
        let mut records = Vec::with_capacity(self.size);
        while records.len() < self.size {
            match self.records.next() {
                Some(Ok(record)) => records.push(record),
                Some(Err(e)) => {
                    self.done = true;
                    if records.is_empty() {
                        return Some(Err(e));
                    }
                    self.deferred = Some(e);
                    break;
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if records.is_empty() {
            return None;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(Ok(Batch { seq, records }))
    }
}

/// Convenience constructor mirroring [`Batcher::new`].
pub fn batched<I, T>(records: I, size: usize) -> Result<Batcher<I::IntoIter>>
where
    I: IntoIterator<Item = Result<T>>,
{
    Batcher::new(records.into_iter(), size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_range(len: usize) -> impl Iterator<Item = Result<usize>> {
        (0..len).map(Ok)
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = batched(ok_range(3), 0).err().unwrap();
        assert!(matches!(err, LoadError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_batch_counts_and_order() {
        for size in 1..=7 {
            for len in 0..=30 {
                let batches: Vec<Batch<usize>> = batched(ok_range(len), size)
                    .unwrap()
                    .map(|b| b.unwrap())
                    .collect();
                assert_eq!(batches.len(), len.div_ceil(size), "len={len} size={size}");

                if let Some((last, full)) = batches.split_last() {
                    assert!(full.iter().all(|b| b.len() == size));
                    assert!(last.len() >= 1 && last.len() <= size);
                }

                let flat: Vec<usize> = batches.iter().flat_map(|b| b.records.clone()).collect();
                assert_eq!(flat, (0..len).collect::<Vec<_>>());

                let seqs: Vec<u64> = batches.iter().map(|b| b.seq).collect();
                assert_eq!(seqs, (1..=batches.len() as u64).collect::<Vec<_>>());
            }
        }
    }

    #[test]
    fn test_twenty_five_thousand_in_tens_of_thousands() {
        let sizes: Vec<usize> = batched(ok_range(25_000), DEFAULT_BATCH_SIZE)
            .unwrap()
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![10_000, 10_000, 5_000]);
    }

    #[test]
    fn test_source_error_ends_sequence() {
        let items = vec![Ok(1), Ok(2), Ok(3), Err(LoadError::Interrupted), Ok(5)];
        let mut batcher = batched(items, 2).unwrap();
        assert_eq!(batcher.next().unwrap().unwrap().records, vec![1, 2]);
        // The record read before the error is not lost.
        let partial = batcher.next().unwrap().unwrap();
        assert_eq!((partial.seq, partial.records), (2, vec![3]));
        assert_eq!(batcher.next().unwrap().unwrap_err(), LoadError::Interrupted);
        assert!(batcher.next().is_none());
    }

    #[test]
    fn test_error_on_batch_boundary() {
        let items = vec![Ok(1), Ok(2), Err(LoadError::Interrupted)];
        let mut batcher = batched(items, 2).unwrap();
        assert_eq!(batcher.next().unwrap().unwrap().records, vec![1, 2]);
        assert_eq!(batcher.next().unwrap().unwrap_err(), LoadError::Interrupted);
        assert!(batcher.next().is_none());
    }
}
