//! Splits a request's short ids into ordered, bounded batches.

use std::vec::IntoIter;

use super::types::Batch;

/// Lazy, order-preserving iterator over fixed-size batches.
///
/// Yields `ceil(N / batch_size)` batches; only the last one may be short and
/// none is empty. Consumes the id list, so it can be walked only once.
#[derive(Debug)]
pub struct BatchSplitter {
    ids: IntoIter<String>,
    batch_size: usize,
    next_index: usize,
}

impl BatchSplitter {
    /// Creates a splitter. `batch_size` must be non-zero.
    pub fn new(short_ids: Vec<String>, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be greater than zero");
        Self {
            ids: short_ids.into_iter(),
            batch_size,
            next_index: 0,
        }
    }

    /// Number of batches the splitter will produce in total.
    pub fn batch_count(len: usize, batch_size: usize) -> usize {
        len.div_ceil(batch_size)
    }
}

impl Iterator for BatchSplitter {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let short_ids: Vec<String> = self.ids.by_ref().take(self.batch_size).collect();
        if short_ids.is_empty() {
            return None;
        }
        let batch = Batch {
            index: self.next_index,
            short_ids,
        };
        self.next_index += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = Self::batch_count(self.ids.len(), self.batch_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for BatchSplitter {}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<String> {
        (1..=n).map(|i| i.to_string()).collect()
    }

    #[test]
    fn test_seven_ids_in_batches_of_three() {
        let batches: Vec<Vec<String>> = BatchSplitter::new(numbered(7), 3)
            .map(|b| b.short_ids)
            .collect();
        assert_eq!(
            batches,
            vec![
                vec!["1".to_string(), "2".to_string(), "3".to_string()],
                vec!["4".to_string(), "5".to_string(), "6".to_string()],
                vec!["7".to_string()],
            ]
        );
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        assert_eq!(BatchSplitter::new(Vec::new(), 100).count(), 0);
    }

    #[test]
    fn test_batch_indices_are_sequential() {
        let indices: Vec<usize> = BatchSplitter::new(numbered(250), 100)
            .map(|b| b.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_concatenation_preserves_input_for_many_sizes() {
        for n in [0usize, 1, 99, 100, 101, 199, 200, 201, 1000, 1234] {
            let input = numbered(n);
            let batches: Vec<Batch> = BatchSplitter::new(input.clone(), 100).collect();

            assert_eq!(batches.len(), n.div_ceil(100), "batch count for n={n}");
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 100));

            let rejoined: Vec<String> = batches.into_iter().flat_map(|b| b.short_ids).collect();
            assert_eq!(rejoined, input, "order preserved for n={n}");
        }
    }

    #[test]
    fn test_size_hint_matches_remaining_batches() {
        let mut splitter = BatchSplitter::new(numbered(7), 3);
        assert_eq!(splitter.len(), 3);
        splitter.next();
        assert_eq!(splitter.len(), 2);
        splitter.next();
        splitter.next();
        assert_eq!(splitter.len(), 0);
    }

    #[test]
    #[should_panic(expected = "batch size")]
    fn test_zero_batch_size_panics() {
        let _ = BatchSplitter::new(numbered(3), 0);
    }
}
