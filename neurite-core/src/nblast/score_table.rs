//! Score table lookup over distance and tangent-alignment bins.

use ndarray::Array2;

use super::NblastError;

const DIST_BINS: usize = 21;
const ADP_BINS: usize = 10;

/// Distance bin bounds in nanometres, last bin unbounded above. The leading
/// `1000, 750` ordering is inherited from the published table and is part of
/// the lookup contract.
const DIST_THRESHOLDS: [f32; DIST_BINS + 1] = [
    1000.0,
    750.0,
    1500.0,
    2000.0,
    2500.0,
    3000.0,
    3500.0,
    4000.0,
    5000.0,
    6000.0,
    7000.0,
    8000.0,
    9000.0,
    10000.0,
    12000.0,
    14000.0,
    16000.0,
    20000.0,
    25000.0,
    30000.0,
    40000.0,
    f32::INFINITY,
];

/// Absolute dot-product bin bounds over `[0, 1]`.
const ADP_THRESHOLDS: [f32; ADP_BINS + 1] =
    [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// NBLAST score table: a `[21, 10]` matrix looked up by binning a physical
/// distance and an absolute tangent dot product.
///
/// # Examples
/// ```
/// use ndarray::Array2;
/// use neurite_core::ScoreTable;
///
/// let table = ScoreTable::new(Array2::from_elem((21, 10), 1.5))?;
/// assert_eq!(table.score(0.0, 1.0), 1.5);
/// # Ok::<(), neurite_core::NblastError>(())
/// ```
#[derive(Clone, Debug)]
pub struct ScoreTable {
    table: Array2<f32>,
}

impl ScoreTable {
    /// Wraps an externally loaded `[21, 10]` score matrix.
    ///
    /// # Errors
    /// Returns [`NblastError::TableShape`] when the matrix is not `21x10`.
    pub fn new(table: Array2<f32>) -> Result<Self, NblastError> {
        let (rows, columns) = table.dim();
        if (rows, columns) != (DIST_BINS, ADP_BINS) {
            return Err(NblastError::TableShape { rows, columns });
        }
        Ok(Self { table })
    }

    /// Looks up the score for a nearest-neighbour distance (nanometres) and
    /// an absolute tangent dot product.
    ///
    /// Out-of-range inputs clamp to the end bins: the last distance bound is
    /// unbounded above, and a dot product can never exceed the final `1.0`
    /// threshold.
    #[must_use]
    pub fn score(&self, distance: f32, dot: f32) -> f32 {
        // A unit-tangent dot product can exceed the final 1.0 bound by a
        // rounding error; clamp both indices to the end bins.
        let row = bisect(&DIST_THRESHOLDS, distance).min(DIST_BINS - 1);
        let column = bisect(&ADP_THRESHOLDS, dot).min(ADP_BINS - 1);
        self.table[[row, column]]
    }
}

/// Largest index `i` such that `value > thresholds[i]`, or `0` when no
/// threshold is exceeded. The half-open halving mirrors python-style
/// uninclusive upper bounds.
fn bisect(thresholds: &[f32], value: f32) -> usize {
    let mut start = 0;
    let mut stop = thresholds.len();
    while stop - start > 1 {
        let middle = start + (stop - start) / 2;
        if value > thresholds[middle] {
            start = middle;
        } else {
            stop = middle;
        }
    }
    start
}
