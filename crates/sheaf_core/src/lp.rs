//! Dense two-phase primal simplex for small inequality-constrained LPs.
//!
//! Every offset tightening, membership box and projection bound in this
//! crate reduces to optimizing a linear functional over `A x <= b` with
//! free variables. Problems here are small (tens of rows, a handful of
//! columns), so a dense tableau with Bland's anti-cycling rule is both
//! simple and fast enough. Free variables are split into positive and
//! negative parts; rows with negative right-hand sides receive
//! artificial variables that phase 1 drives to zero.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SheafError};

/// Pivot admission threshold. Entries smaller than this are treated as
/// zero during entering/leaving selection.
const PIVOT_EPS: f64 = 1e-9;

/// Tolerance on the phase-1 optimum deciding feasibility.
const PHASE1_EPS: f64 = 1e-7;

/// Tolerance for ratio-test ties, resolved by Bland's rule.
const RATIO_EPS: f64 = 1e-9;

/// Optimal value and an attaining point of a linear program.
#[derive(Debug, Clone)]
pub struct LpSolution {
    /// Optimal objective value.
    pub value: f64,
    /// A vertex of the feasible region attaining the optimum.
    pub point: DVector<f64>,
}

/// Maximizes `objective . x` subject to `a x <= b` with `x` free.
///
/// Returns [`SheafError::InfeasibleRegion`] when no point satisfies the
/// constraints and [`SheafError::Unbounded`] when the objective grows
/// without bound over the feasible region.
pub fn maximize(objective: &DVector<f64>, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<LpSolution> {
    let m = a.nrows();
    let n = a.ncols();
    if objective.len() != n {
        return Err(SheafError::DimensionMismatch {
            what: "lp objective",
            expected: n,
            found: objective.len(),
        });
    }
    if b.len() != m {
        return Err(SheafError::DimensionMismatch {
            what: "lp right-hand side",
            expected: m,
            found: b.len(),
        });
    }

    // Column layout: x+ (n), x- (n), slacks (m), artificials, rhs.
    let flip: Vec<bool> = (0..m).map(|i| b[i] < 0.0).collect();
    let num_art = flip.iter().filter(|&&f| f).count();
    let slack_start = 2 * n;
    let art_start = slack_start + m;
    let width = art_start + num_art + 1;
    let rhs = width - 1;

    let mut tab = DMatrix::zeros(m, width);
    let mut basis = vec![0usize; m];
    let mut next_art = art_start;
    for i in 0..m {
        // Flipping rows with negative rhs keeps the tableau's rhs
        // column nonnegative, the invariant the ratio test relies on.
        let sign = if flip[i] { -1.0 } else { 1.0 };
        for j in 0..n {
            tab[(i, j)] = sign * a[(i, j)];
            tab[(i, n + j)] = -sign * a[(i, j)];
        }
        tab[(i, slack_start + i)] = sign;
        tab[(i, rhs)] = sign * b[i];
        if flip[i] {
            tab[(i, next_art)] = 1.0;
            basis[i] = next_art;
            next_art += 1;
        } else {
            basis[i] = slack_start + i;
        }
    }

    let mut budget = 1000 + 200 * (m + n);

    if num_art > 0 {
        // Phase 1: maximize the negated artificial sum; feasible iff it
        // reaches (numerical) zero.
        let mut zrow = DVector::zeros(width);
        for i in 0..m {
            if basis[i] >= art_start {
                for j in 0..width {
                    zrow[j] -= tab[(i, j)];
                }
            }
        }
        for j in art_start..rhs {
            zrow[j] = 0.0;
        }
        loop {
            let Some(col) = entering(&zrow, art_start) else {
                break;
            };
            let Some(row) = leaving_row(&tab, &basis, col) else {
                // The artificial sum is bounded below by zero; a failed
                // ratio test means the tableau lost consistency.
                return Err(SheafError::InfeasibleRegion);
            };
            pivot(&mut tab, &mut zrow, &mut basis, row, col);
            spend(&mut budget);
        }
        if zrow[rhs] < -PHASE1_EPS {
            return Err(SheafError::InfeasibleRegion);
        }
        // Degenerate optima can leave an artificial basic at zero.
        // Pivot it onto a structural column; rows admitting no such
        // pivot are redundant and stay inert.
        for i in 0..m {
            if basis[i] >= art_start {
                if let Some(col) = (0..art_start).find(|&j| tab[(i, j)].abs() > PIVOT_EPS) {
                    pivot(&mut tab, &mut zrow, &mut basis, i, col);
                }
            }
        }
    }

    // Phase 2 over the true objective; artificial columns never enter.
    let mut cost = DVector::zeros(width);
    for j in 0..n {
        cost[j] = objective[j];
        cost[n + j] = -objective[j];
    }
    let mut zrow = DVector::zeros(width);
    for j in 0..width {
        let mut acc = 0.0;
        for i in 0..m {
            acc += cost[basis[i]] * tab[(i, j)];
        }
        zrow[j] = acc;
        if j != rhs {
            zrow[j] -= cost[j];
        }
    }
    loop {
        let Some(col) = entering(&zrow, art_start) else {
            break;
        };
        let Some(row) = leaving_row(&tab, &basis, col) else {
            return Err(SheafError::Unbounded);
        };
        pivot(&mut tab, &mut zrow, &mut basis, row, col);
        spend(&mut budget);
    }

    let mut point = DVector::zeros(n);
    for i in 0..m {
        let col = basis[i];
        let value = tab[(i, rhs)];
        if col < n {
            point[col] += value;
        } else if col < slack_start {
            point[col - n] -= value;
        }
    }
    let value = objective.dot(&point);
    Ok(LpSolution { value, point })
}

/// Minimizes `objective . x` subject to `a x <= b` with `x` free.
pub fn minimize(objective: &DVector<f64>, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<LpSolution> {
    let negated = objective.map(|v| -v);
    let sol = maximize(&negated, a, b)?;
    Ok(LpSolution {
        value: -sol.value,
        point: sol.point,
    })
}

/// Bland's rule: the lowest-index column with a favorable reduced cost.
fn entering(zrow: &DVector<f64>, art_start: usize) -> Option<usize> {
    (0..art_start).find(|&j| zrow[j] < -PIVOT_EPS)
}

/// Minimum-ratio row for the entering column, ties broken by the
/// smallest basic column index (Bland's rule).
fn leaving_row(tab: &DMatrix<f64>, basis: &[usize], col: usize) -> Option<usize> {
    let rhs = tab.ncols() - 1;
    let mut best: Option<(usize, f64)> = None;
    for i in 0..tab.nrows() {
        let coeff = tab[(i, col)];
        if coeff <= PIVOT_EPS {
            continue;
        }
        let ratio = tab[(i, rhs)] / coeff;
        best = Some(match best {
            None => (i, ratio),
            Some((bi, br)) => {
                if ratio < br - RATIO_EPS {
                    (i, ratio)
                } else if ratio > br + RATIO_EPS || basis[bi] < basis[i] {
                    (bi, br)
                } else {
                    (i, ratio)
                }
            }
        });
    }
    best.map(|(i, _)| i)
}

fn pivot(
    tab: &mut DMatrix<f64>,
    zrow: &mut DVector<f64>,
    basis: &mut [usize],
    row: usize,
    col: usize,
) {
    let width = tab.ncols();
    let pivot = tab[(row, col)];
    for j in 0..width {
        tab[(row, j)] /= pivot;
    }
    tab[(row, col)] = 1.0;
    for i in 0..tab.nrows() {
        if i == row {
            continue;
        }
        let factor = tab[(i, col)];
        if factor != 0.0 {
            for j in 0..width {
                tab[(i, j)] -= factor * tab[(row, j)];
            }
            tab[(i, col)] = 0.0;
        }
    }
    let factor = zrow[col];
    if factor != 0.0 {
        for j in 0..width {
            zrow[j] -= factor * tab[(row, j)];
        }
        zrow[col] = 0.0;
    }
    basis[row] = col;
}

fn spend(budget: &mut usize) {
    // Bland's rule rules out cycling, so exhausting the budget can only
    // mean a bug in the pivot logic.
    assert!(*budget > 0, "simplex exceeded its pivot budget");
    *budget -= 1;
}
