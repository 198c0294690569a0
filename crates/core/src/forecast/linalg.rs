use super::{ForecastError, Result};

/// Accumulates `XᵀX` and `Xᵀy` row by row for a least squares fit.
#[derive(Debug, Clone)]
pub(crate) struct NormalEquations {
    dim: usize,
    xtx: Vec<f64>,
    xty: Vec<f64>,
}

impl NormalEquations {
    pub(crate) fn new(dim: usize) -> Self {
        Self {
            dim,
            xtx: vec![0.0; dim * dim],
            xty: vec![0.0; dim],
        }
    }

    pub(crate) fn accumulate(&mut self, row: &[f64], y: f64) {
        debug_assert_eq!(row.len(), self.dim);
        for i in 0..self.dim {
            let xi = row[i];
            if xi == 0.0 {
                continue;
            }
            self.xty[i] += xi * y;
            // Upper triangle only; mirrored in `solve`.
            for j in i..self.dim {
                self.xtx[i * self.dim + j] += xi * row[j];
            }
        }
    }

    /// Solves `(XᵀX + diag(penalty)) β = Xᵀy`.
    pub(crate) fn solve(&self, penalty: &[f64]) -> Result<Vec<f64>> {
        debug_assert_eq!(penalty.len(), self.dim);
        let n = self.dim;
        let mut a = self.xtx.clone();
        for i in 0..n {
            a[i * n + i] += penalty[i];
            for j in 0..i {
                a[i * n + j] = a[j * n + i];
            }
        }
        cholesky_solve(&mut a, &self.xty, n)
    }
}

/// Solves `A x = b` for symmetric positive definite `A` (row-major, overwritten with L).
pub(crate) fn cholesky_solve(a: &mut [f64], b: &[f64], n: usize) -> Result<Vec<f64>> {
    for j in 0..n {
        let mut diag = a[j * n + j];
        for k in 0..j {
            diag -= a[j * n + k] * a[j * n + k];
        }
        if !(diag > 0.0) || !diag.is_finite() {
            return Err(ForecastError::Singular(j));
        }
        let ljj = diag.sqrt();
        a[j * n + j] = ljj;

        for i in (j + 1)..n {
            let mut v = a[i * n + j];
            for k in 0..j {
                v -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = v / ljj;
        }
    }

    // L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= a[i * n + k] * z[k];
        }
        z[i] = v / a[i * n + i];
    }

    // Lᵀ x = z
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut v = z[i];
        for k in (i + 1)..n {
            v -= a[k * n + i] * x[k];
        }
        x[i] = v / a[i * n + i];
    }

    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn solves_spd_system() {
        // [[4,2,0],[2,5,1],[0,1,3]] x = [2,1,3]
        let mut a = vec![4.0, 2.0, 0.0, 2.0, 5.0, 1.0, 0.0, 1.0, 3.0];
        let x = cholesky_solve(&mut a, &[2.0, 1.0, 3.0], 3).unwrap();
        let a0 = [4.0, 2.0, 0.0, 2.0, 5.0, 1.0, 0.0, 1.0, 3.0];
        for (i, b) in [2.0, 1.0, 3.0].iter().enumerate() {
            let lhs: f64 = (0..3).map(|j| a0[i * 3 + j] * x[j]).sum();
            assert!(close(lhs, *b), "row {i}: {lhs} != {b}");
        }
    }

    #[test]
    fn rejects_indefinite_matrix() {
        let mut a = vec![1.0, 2.0, 2.0, 1.0];
        assert_eq!(
            cholesky_solve(&mut a, &[1.0, 1.0], 2),
            Err(ForecastError::Singular(1))
        );
    }

    #[test]
    fn least_squares_recovers_line() {
        let mut eq = NormalEquations::new(2);
        for i in 0..10 {
            let x = i as f64;
            eq.accumulate(&[1.0, x], 3.0 + 2.0 * x);
        }
        let beta = eq.solve(&[0.0, 0.0]).unwrap();
        assert!(close(beta[0], 3.0));
        assert!(close(beta[1], 2.0));
    }

    #[test]
    fn ridge_penalty_splits_collinear_columns() {
        let mut eq = NormalEquations::new(2);
        for i in 0..5 {
            let x = i as f64;
            eq.accumulate(&[x, x], x);
        }
        let beta = eq.solve(&[1e-6, 1e-6]).unwrap();
        assert!((beta[0] + beta[1] - 1.0).abs() < 1e-3);
        assert!((beta[0] - beta[1]).abs() < 1e-3);
    }
}
