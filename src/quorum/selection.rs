//! Quorum selection.
//!
//! Picks which nodes serve a request: a single uniformly random node for
//! one-off calls and `k` distinct nodes for threshold retrieval.

use rand::Rng;

use crate::error::{HarnessError, HarnessResult};

/// Picks one node index uniformly from `[0, n)`.
pub fn pick_one<R: Rng + ?Sized>(n: usize, rng: &mut R) -> HarnessResult<usize> {
    if n == 0 {
        return Err(HarnessError::QuorumTooLarge { requested: 1, available: 0 });
    }
    Ok(rng.gen_range(0, n))
}

/// Picks `k` distinct node indices from `[0, n)`, uniformly without
/// replacement.
///
/// Each pick is drawn uniformly and re-drawn on collision with an earlier
/// pick. The order of the returned indices carries no meaning.
pub fn pick_distinct<R: Rng + ?Sized>(k: usize, n: usize, rng: &mut R) -> HarnessResult<Vec<usize>> {
    if k > n {
        return Err(HarnessError::QuorumTooLarge { requested: k, available: n });
    }
    let mut chosen = Vec::with_capacity(k);
    while chosen.len() < k {
        let candidate = rng.gen_range(0, n);
        if !chosen.contains(&candidate) {
            chosen.push(candidate);
        }
    }
    Ok(chosen)
}
