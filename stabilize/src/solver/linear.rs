//! Sparse weighted least squares over difference constraints.
//!
//! Minimises `sum_i w_i |r_i|^p + alpha * sum_k |x[b_k] - x[a_k]|^q` with
//! `r = A x - y`, where `(a_k, b_k)` runs over consecutive constrained
//! frames. Solved by iteratively reweighted least squares; every reweighted
//! normal system goes through a Jacobi-preconditioned conjugate gradient that
//! only ever touches the sparse matrices.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Floor applied to residuals and differences before raising to a negative
/// power. IRLS cannot resolve steps finer than this.
const REWEIGHT_EPS: f64 = 1e-6;

/// Diagonal shift keeping the normal matrix positive definite.
const RIDGE: f64 = 1e-9;

/// Relative residual at which the inner conjugate gradient stops.
const CG_TOLERANCE: f64 = 1e-12;

/// `x[u] - x[v] = target`, weighted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Constraint {
    pub u: usize,
    pub v: usize,
    pub target: f64,
    pub weight: f64,
}

/// Difference constraints plus the anchor row `x[0] = 0`, and the smoothing
/// operator linking consecutive constrained frames.
#[derive(Debug, Clone)]
pub(crate) struct DifferenceSystem {
    matrix: CsrMatrix<f64>,
    smoothing: CsrMatrix<f64>,
    rhs: DVector<f64>,
    weights: DVector<f64>,
    /// Columns touched by at least one row.
    active: Vec<bool>,
}

impl DifferenceSystem {
    /// Indices of `constraints` must be distinct and below `length`.
    pub fn new(length: usize, constraints: &[Constraint]) -> Self {
        let rows = constraints.len() + 1;
        let mut coo = CooMatrix::new(rows, length);
        let mut rhs = DVector::zeros(rows);
        let mut weights = DVector::from_element(rows, 1.0);
        let mut active = vec![false; length];

        for (row, c) in constraints.iter().enumerate() {
            coo.push(row, c.u, 1.0);
            coo.push(row, c.v, -1.0);
            rhs[row] = c.target;
            weights[row] = c.weight;
            active[c.u] = true;
            active[c.v] = true;
        }

        // anchor
        coo.push(rows - 1, 0, 1.0);
        active[0] = true;

        // Unconstrained columns stay out of the chain so they remain decoupled.
        let chain: Vec<usize> = (0..length).filter(|&j| active[j]).collect();
        let mut smoothing = CooMatrix::new(chain.len().saturating_sub(1), length);
        for (row, pair) in chain.windows(2).enumerate() {
            smoothing.push(row, pair[1], 1.0);
            smoothing.push(row, pair[0], -1.0);
        }

        Self {
            matrix: CsrMatrix::from(&coo),
            smoothing: CsrMatrix::from(&smoothing),
            rhs,
            weights,
            active,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.matrix.ncols()
    }

    /// `A x`
    fn multiply(&self, x: &DVector<f64>) -> DVector<f64> {
        sparse_multiply(&self.matrix, x)
    }

    /// `A^T r`
    fn multiply_transpose(&self, r: &DVector<f64>) -> DVector<f64> {
        sparse_multiply_transpose(&self.matrix, r)
    }

    /// `L x`: differences between consecutive constrained frames.
    fn differences(&self, x: &DVector<f64>) -> DVector<f64> {
        sparse_multiply(&self.smoothing, x)
    }

    pub fn residual(&self, x: &DVector<f64>) -> DVector<f64> {
        self.multiply(x) - &self.rhs
    }

    pub fn objective(&self, x: &DVector<f64>, params: &LpParams) -> f64 {
        let data: f64 = self
            .residual(x)
            .iter()
            .zip(self.weights.iter())
            .map(|(r, w)| w * r.abs().powf(params.order_error))
            .sum();
        let regularisation: f64 = self
            .differences(x)
            .iter()
            .map(|d| d.abs().powf(params.order_reg))
            .sum();
        data + params.alpha * regularisation
    }

    /// Solves `(A^T Ω A + L^T N L + diag(d)) x = A^T Ω y` starting from `start`.
    fn solve_normal(
        &self,
        omega: &DVector<f64>,
        nu: &DVector<f64>,
        diagonal: &DVector<f64>,
        start: &DVector<f64>,
    ) -> DVector<f64> {
        let apply = |p: &DVector<f64>| -> DVector<f64> {
            self.multiply_transpose(&self.multiply(p).component_mul(omega))
                + sparse_multiply_transpose(&self.smoothing, &self.differences(p).component_mul(nu))
                + diagonal.component_mul(p)
        };

        let mut jacobi = diagonal.clone();
        for (matrix, row_weights) in [(&self.matrix, omega), (&self.smoothing, nu)] {
            for (i, row) in matrix.row_iter().enumerate() {
                for (&j, &a) in row.col_indices().iter().zip(row.values()) {
                    jacobi[j] += row_weights[i] * a * a;
                }
            }
        }
        let inverse_jacobi = jacobi.map(|d| if d > 0.0 { 1.0 / d } else { 1.0 });

        let b = self.multiply_transpose(&self.rhs.component_mul(omega));
        let threshold = CG_TOLERANCE * b.norm().max(f64::MIN_POSITIVE);
        let max_iterations = 10 * self.columns() + 100;

        let mut x = start.clone();
        let mut r = &b - apply(&x);
        if r.norm() <= threshold {
            return x;
        }
        let mut z = r.component_mul(&inverse_jacobi);
        let mut p = z.clone();
        let mut rz = r.dot(&z);

        for _ in 0..max_iterations {
            let ap = apply(&p);
            let pap = p.dot(&ap);
            if pap <= 0.0 || !pap.is_finite() {
                break;
            }
            let step = rz / pap;
            x.axpy(step, &p, 1.0);
            r.axpy(-step, &ap, 1.0);
            if r.norm() <= threshold {
                break;
            }
            z = r.component_mul(&inverse_jacobi);
            let rz_next = r.dot(&z);
            p = &z + &p * (rz_next / rz);
            rz = rz_next;
        }
        x
    }
}

fn sparse_multiply(matrix: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        matrix.nrows(),
        matrix.row_iter().map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .map(|(&j, &a)| a * x[j])
                .sum::<f64>()
        }),
    )
}

fn sparse_multiply_transpose(matrix: &CsrMatrix<f64>, r: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(matrix.ncols());
    for (i, row) in matrix.row_iter().enumerate() {
        for (&j, &a) in row.col_indices().iter().zip(row.values()) {
            out[j] += a * r[i];
        }
    }
    out
}

/// IRLS weight turning `|v|^order` into a quadratic around the current `v`.
#[inline]
fn reweight(value: f64, order: f64) -> f64 {
    (order / 2.0) * value.abs().max(REWEIGHT_EPS).powf(order - 2.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LpParams {
    pub order_error: f64,
    pub order_reg: f64,
    pub alpha: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct LpSolution {
    pub x: DVector<f64>,
    pub iterations: usize,
    pub objective: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NotConverged {
    pub iterations: usize,
    pub step: f64,
}

/// Iteratively reweighted least squares.
///
/// Starts from the weighted quadratic solution. Converged once the max-norm
/// step is below `tolerance * (1 + |x|_inf)` (never finer than the reweighting
/// floor) or the objective changes by less than `tolerance` relative to its
/// previous value. A non-finite objective fails immediately.
pub(crate) fn solve_lp(system: &DifferenceSystem, params: &LpParams) -> Result<LpSolution, NotConverged> {
    let n = system.columns();
    let diagonal = DVector::from_fn(n, |j, _| if system.active[j] { RIDGE } else { 1.0 });
    let smoothing_rows = system.smoothing.nrows();

    let mut x = system.solve_normal(
        &system.weights,
        &DVector::from_element(smoothing_rows, params.alpha),
        &diagonal,
        &DVector::zeros(n),
    );
    let mut objective = system.objective(&x, params);
    let mut step = f64::INFINITY;

    // Objective of a solution whose every residual sits at the reweighting floor.
    let objective_floor = system.weights.sum() * REWEIGHT_EPS.powf(params.order_error);

    for iteration in 1..=params.max_iterations {
        let residual = system.residual(&x);
        let omega = DVector::from_fn(system.rows(), |i, _| {
            system.weights[i] * reweight(residual[i], params.order_error)
        });
        let differences = system.differences(&x);
        let nu = differences.map(|d| params.alpha * reweight(d, params.order_reg));

        let next = system.solve_normal(&omega, &nu, &diagonal, &x);
        step = (&next - &x).amax();
        let next_objective = system.objective(&next, params);
        if !next_objective.is_finite() || !step.is_finite() {
            return Err(NotConverged {
                iterations: iteration,
                step,
            });
        }
        let scale = 1.0 + next.amax();
        let objective_change = (objective - next_objective).abs();
        x = next;
        objective = next_objective;

        if step <= (params.tolerance * scale).max(REWEIGHT_EPS)
            || objective_change <= params.tolerance * objective.max(objective_floor)
        {
            return Ok(LpSolution {
                x,
                iterations: iteration,
                objective,
            });
        }
    }

    Err(NotConverged {
        iterations: params.max_iterations,
        step,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(order_error: f64, alpha: f64) -> LpParams {
        LpParams {
            order_error,
            order_reg: 2.0,
            alpha,
            tolerance: 1e-9,
            max_iterations: 500,
        }
    }

    fn chain(values: &[f64]) -> Vec<Constraint> {
        (1..values.len())
            .map(|i| Constraint {
                u: i - 1,
                v: i,
                target: values[i - 1] - values[i],
                weight: 1.0,
            })
            .collect()
    }

    #[test]
    fn test_system_shape() {
        let system = DifferenceSystem::new(4, &chain(&[0.0, 1.0, 2.0, 3.0]));
        assert_eq!(system.rows(), 4);
        assert_eq!(system.columns(), 4);
        assert!(system.active.iter().all(|&a| a));
    }

    #[test]
    fn test_multiply_and_transpose() {
        let system = DifferenceSystem::new(3, &chain(&[0.0, 0.0, 0.0]));
        let x = DVector::from_vec(vec![1.0, 2.0, 4.0]);
        // rows: x0 - x1, x1 - x2, x0
        assert_eq!(system.multiply(&x).as_slice(), &[-1.0, -2.0, 1.0]);
        let r = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        // columns: [1 + 1, -1 + 1, -1]
        assert_eq!(system.multiply_transpose(&r).as_slice(), &[2.0, 0.0, -1.0]);
    }

    #[test]
    fn test_exact_chain_least_squares() {
        let truth = [0.0, 1.0, 3.0, 2.0, -1.0];
        let system = DifferenceSystem::new(5, &chain(&truth));
        let solution = solve_lp(&system, &params(2.0, 0.0)).unwrap();
        for (j, &t) in truth.iter().enumerate() {
            assert!((solution.x[j] - t).abs() < 1e-6, "x[{j}] = {}", solution.x[j]);
        }
    }

    #[test]
    fn test_l1_rejects_outlier() {
        // Frame values 0, 1, 2, 3 with every pair measured and one corrupt pair.
        let truth = [0.0, 1.0, 2.0, 3.0];
        let mut constraints = Vec::new();
        for u in 0..4 {
            for v in (u + 1)..4 {
                constraints.push(Constraint {
                    u,
                    v,
                    target: truth[u] - truth[v],
                    weight: 1.0,
                });
            }
        }
        constraints[2].target += 25.0;

        let system = DifferenceSystem::new(4, &constraints);
        let l1 = solve_lp(&system, &params(1.0, 1e-6)).unwrap();
        let l2 = solve_lp(&system, &params(2.0, 1e-6)).unwrap();

        let l1_error: f64 = (0..4).map(|j| (l1.x[j] - truth[j]).abs()).fold(0.0, f64::max);
        let l2_error: f64 = (0..4).map(|j| (l2.x[j] - truth[j]).abs()).fold(0.0, f64::max);
        assert!(l1_error < 1e-3, "L1 error {l1_error}");
        assert!(l2_error > 1.0, "L2 error {l2_error}");
    }

    #[test]
    fn test_smoothing_pulls_neighbours_together() {
        let truth = [0.0, 4.0];
        let system = DifferenceSystem::new(2, &chain(&truth));
        let solution = solve_lp(&system, &params(2.0, 1.0)).unwrap();
        // min (x0 - x1 + 4)^2 + x0^2 + (x1 - x0)^2
        assert!((solution.x[0]).abs() < 1e-6, "x0 = {}", solution.x[0]);
        assert!((solution.x[1] - 2.0).abs() < 1e-6, "x1 = {}", solution.x[1]);
    }

    #[test]
    fn test_smoothing_chain_skips_unconstrained_columns() {
        let constraints = vec![
            Constraint {
                u: 0,
                v: 1,
                target: -1.0,
                weight: 1.0,
            },
            Constraint {
                u: 1,
                v: 3,
                target: -1.0,
                weight: 1.0,
            },
        ];
        let system = DifferenceSystem::new(4, &constraints);
        assert!(!system.active[2]);
        assert_eq!(system.smoothing.nrows(), 2);
        let x = DVector::from_vec(vec![0.0, 1.0, 7.0, 2.0]);
        assert_eq!(system.differences(&x).as_slice(), &[1.0, 1.0]);
    }

    #[test]
    fn test_l1_smoothing_keeps_exact_curved_data() {
        // Every pair measured exactly on a strongly curved track.
        let truth: Vec<f64> = (0..12).map(|i| 0.5 * (i * i) as f64).collect();
        let mut constraints = Vec::new();
        for u in 0..truth.len() {
            for scale in [1, 2, 3, 5, 8] {
                if u + scale < truth.len() {
                    constraints.push(Constraint {
                        u,
                        v: u + scale,
                        target: truth[u] - truth[u + scale],
                        weight: 0.9,
                    });
                }
            }
        }
        let system = DifferenceSystem::new(truth.len(), &constraints);
        let solution = solve_lp(&system, &params(1.0, 0.1)).unwrap();
        for (j, &t) in truth.iter().enumerate() {
            assert!((solution.x[j] - t).abs() < 1e-3, "x[{j}] = {}", solution.x[j]);
        }
    }

    #[test]
    fn test_l1_converges_at_default_tolerance() {
        // Inconsistent measurements: the reweighting floor bounds the reachable step.
        let mut constraints = chain(&[0.0, 1.0, 2.5, 2.0, 4.0, 3.0]);
        constraints.push(Constraint {
            u: 0,
            v: 3,
            target: -1.7,
            weight: 0.6,
        });
        constraints.push(Constraint {
            u: 2,
            v: 5,
            target: 0.3,
            weight: 0.4,
        });
        let system = DifferenceSystem::new(6, &constraints);
        let result = solve_lp(
            &system,
            &LpParams {
                tolerance: 1e-7,
                max_iterations: 200,
                ..params(1.0, 0.1)
            },
        );
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn test_inactive_column_stays_zero() {
        let constraints = vec![Constraint {
            u: 0,
            v: 1,
            target: -2.0,
            weight: 1.0,
        }];
        let system = DifferenceSystem::new(3, &constraints);
        assert!(!system.active[2]);
        let solution = solve_lp(&system, &params(2.0, 0.0)).unwrap();
        assert!((solution.x[1] - 2.0).abs() < 1e-6);
        assert_eq!(solution.x[2], 0.0);
    }

    #[test]
    fn test_zero_iteration_budget_fails() {
        let system = DifferenceSystem::new(3, &chain(&[0.0, 1.0, 5.0]));
        let result = solve_lp(
            &system,
            &LpParams {
                max_iterations: 0,
                ..params(1.0, 0.1)
            },
        );
        assert!(matches!(result, Err(NotConverged { iterations: 0, .. })));
    }
}
