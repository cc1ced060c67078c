//! Linear-constraint projection of search directions.
//!
//! Moving along a projected direction leaves the constrained quantity
//! unchanged to first order.

use ndarray::{ArrayViewMut1, ArrayViewMut2, Axis};

/// Constraint removed from every search direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FluxConstraint {
    #[default]
    None,
    /// Hold `sum(F)` fixed: project out the all-ones vector.
    TotalFlux,
}

/// Projects columns of a search basis onto the orthogonal complement of the
/// constraint vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubspaceProjector {
    constraint: FluxConstraint,
}

impl SubspaceProjector {
    pub fn new(constraint: FluxConstraint) -> Self {
        SubspaceProjector { constraint }
    }

    pub fn from_preserve_flux(preserve_flux: bool) -> Self {
        if preserve_flux {
            Self::new(FluxConstraint::TotalFlux)
        } else {
            Self::new(FluxConstraint::None)
        }
    }

    pub fn constraint(&self) -> FluxConstraint {
        self.constraint
    }

    pub fn is_active(&self) -> bool {
        self.constraint != FluxConstraint::None
    }

    /// Project a single direction in place.
    pub fn project(&self, mut direction: ArrayViewMut1<f64>) {
        match self.constraint {
            FluxConstraint::None => {}
            FluxConstraint::TotalFlux => {
                let n = direction.len();
                if n == 0 {
                    return;
                }
                // <d, 1> / <1, 1>
                let mean = direction.sum() / n as f64;
                direction.mapv_inplace(|v| v - mean);
            }
        }
    }

    /// Project the listed columns of an N×K basis in place.
    pub fn project_columns(&self, mut basis: ArrayViewMut2<f64>, columns: &[usize]) {
        if !self.is_active() {
            return;
        }
        for &k in columns {
            self.project(basis.index_axis_mut(Axis(1), k));
        }
    }
}

/// Scale `values` to unit sum while keeping every entry at or above `floor`.
///
/// Entries that would fall below the floor are pinned at it and the rest are
/// rescaled to carry the remaining flux, repeated until no free entry drops
/// under the floor. Entries must already be finite and at or above `floor`.
///
/// Returns `false` when `len * floor >= 1`, where no such spectrum exists;
/// `values` is then set uniform.
pub fn normalise_above_floor(mut values: ArrayViewMut1<f64>, floor: f64) -> bool {
    let n = values.len();
    if n == 0 {
        return true;
    }
    if n as f64 * floor >= 1.0 {
        values.fill(1.0 / n as f64);
        return false;
    }

    let mut pinned = vec![false; n];
    let mut n_pinned = 0usize;
    loop {
        let free_sum: f64 = values
            .iter()
            .zip(&pinned)
            .filter(|&(_, &p)| !p)
            .map(|(&v, _)| v)
            .sum();
        let budget = 1.0 - n_pinned as f64 * floor;
        if free_sum <= 0.0 || !free_sum.is_finite() {
            // Only reachable through rounding; share the budget evenly.
            let share = budget / (n - n_pinned).max(1) as f64;
            for (v, &p) in values.iter_mut().zip(&pinned) {
                *v = if p { floor } else { share };
            }
            return true;
        }
        let scale = budget / free_sum;

        let mut newly_pinned = 0usize;
        for (v, p) in values.iter().zip(pinned.iter_mut()) {
            if !*p && v * scale < floor {
                *p = true;
                newly_pinned += 1;
            }
        }
        if newly_pinned == 0 || n_pinned + newly_pinned == n {
            for (v, &p) in values.iter_mut().zip(&pinned) {
                *v = if p { floor } else { *v * scale };
            }
            return true;
        }
        n_pinned += newly_pinned;
    }
}
