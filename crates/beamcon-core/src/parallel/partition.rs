use std::ops::Range;

/// Contiguous slice of `0..dims` owned by `rank` out of `ranks`.
///
/// The first `dims % ranks` ranks take one extra unit.
pub fn rank_range(dims: usize, ranks: usize, rank: usize) -> Range<usize> {
    if ranks == 0 || rank >= ranks {
        return 0..0;
    }
    let base = dims / ranks;
    let extra = dims % ranks;
    let start = rank * base + rank.min(extra);
    let len = base + usize::from(rank < extra);
    start..start + len
}

/// Slices for every rank, in rank order.
pub fn partition(dims: usize, ranks: usize) -> Vec<Range<usize>> {
    (0..ranks).map(|rank| rank_range(dims, ranks, rank)).collect()
}
