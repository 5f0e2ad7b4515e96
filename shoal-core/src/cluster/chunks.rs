/// Chunk size for `total` records over `workers` ranks with oversubscription
/// factor `parts`: `max(1, ceil(total / (workers * parts)))`. Cutting each
/// worker's share into `parts` pieces lets fast ranks claim more chunks than
/// slow ones.
pub fn chunk_len(total: usize, workers: usize, parts: usize) -> usize {
    let lanes = workers.max(1) * parts.max(1);
    total.div_ceil(lanes).max(1)
}

/// All half-open chunk bounds over `[0, total)`, in claim order, the last one
/// clipped to `total`.
pub fn chunk_bounds(total: usize, size: usize) -> Vec<(usize, usize)> {
    let size = size.max(1);
    (0..total)
        .step_by(size)
        .map(|start| (start, usize::min(start + size, total)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_len_is_ceil_division() {
        assert_eq!(chunk_len(100, 2, 10), 5);
        assert_eq!(chunk_len(101, 2, 10), 6);
        assert_eq!(chunk_len(3, 2, 1), 2);
    }

    #[test]
    fn chunk_len_never_below_one() {
        assert_eq!(chunk_len(3, 8, 10), 1);
        assert_eq!(chunk_len(0, 4, 10), 1);
    }

    #[test]
    fn bounds_partition_the_range_exactly() {
        for total in [0, 1, 3, 10, 101, 1000] {
            for workers in [1, 2, 3, 8] {
                for parts in [1, 2, 10] {
                    let size = chunk_len(total, workers, parts);
                    let bounds = chunk_bounds(total, size);
                    let mut covered = 0;
                    for &(start, end) in &bounds {
                        assert_eq!(start, covered, "gap or overlap at {start}");
                        assert!(end > start && end <= total);
                        covered = end;
                    }
                    assert_eq!(covered, total);
                }
            }
        }
    }
}
