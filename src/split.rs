//! Deterministic train/test splitting
//!
//! Row indices are shuffled with a seeded RNG, so the same
//! `(row count, test fraction, seed)` triple always produces the same
//! partition. This is what lets the retrain flow rebuild the exact folds an
//! earlier experiment saw from nothing but its stored `train_config`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{Error, Result};

/// Seed used when a stored train config lacks `random_state`.
pub const DEFAULT_RANDOM_STATE: u64 = 42;

/// Test fraction used when a stored train config lacks `test_size`.
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Partition `0..num_rows` into shuffled (train, test) index sets.
///
/// The test fold receives `ceil(num_rows * test_size)` rows, clamped so both
/// folds are non-empty.
///
/// # Errors
///
/// Returns [`Error::Config`] if `test_size` is outside `(0, 1)` or there are
/// fewer than two rows to split.
pub fn train_test_split(
    num_rows: usize,
    test_size: f64,
    random_state: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(Error::Config(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    if num_rows < 2 {
        return Err(Error::Config(format!(
            "need at least 2 rows to split, got {num_rows}"
        )));
    }

    let mut indices: Vec<usize> = (0..num_rows).collect();
    let mut rng = StdRng::seed_from_u64(random_state);
    indices.shuffle(&mut rng);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let test_count = ((num_rows as f64 * test_size).ceil() as usize).clamp(1, num_rows - 1);

    let test = indices[..test_count].to_vec();
    let train = indices[test_count..].to_vec();
    Ok((train, test))
}
