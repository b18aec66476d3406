//! Native backend using nalgebra.
//!
//! Reconstructs a dense matrix from the COO triplets and runs a dense LU
//! decomposition. Suitable for small-to-medium meshes (up to roughly
//! 10,000 degrees of freedom); larger problems would swap in an external
//! sparse direct package behind the same trait.

use super::traits::*;
use nalgebra::{DMatrix, DVector, Dyn, LU};

/// Native solver backend using nalgebra for all numerical operations.
pub struct NativeBackend;

/// Dense LU factorization retained for repeated back-substitution
pub struct NativeFactorization {
    lu: LU<f64, Dyn, Dyn>,
    singular: bool,
}

impl Factorization for NativeFactorization {
    fn solve(&self, rhs: &DVector<f64>) -> Option<DVector<f64>> {
        if self.singular {
            return None;
        }
        self.lu.solve(rhs)
    }
}

impl LinearSolver for NativeBackend {
    fn factorize(
        &self,
        matrix: &SparseTripletsF64,
    ) -> Result<(Box<dyn Factorization>, SolveInfo), BackendError> {
        if matrix.nrows != matrix.ncols {
            return Err("tangent matrix must be square".into());
        }
        let n = matrix.nrows;

        // Reconstruct dense matrix from COO triplets; duplicates sum.
        let mut k = DMatrix::zeros(n, n);
        for i in 0..matrix.nnz() {
            let r = matrix.row_indices[i];
            let c = matrix.col_indices[i];
            if r >= n || c >= n {
                return Err(BackendError(format!(
                    "triplet index ({r}, {c}) out of range for {n} dofs"
                )));
            }
            k[(r, c)] += matrix.values[i];
        }

        let lu = k.lu();
        let singular = lu
            .u()
            .diagonal()
            .iter()
            .any(|&d: &f64| d.abs() < 1e-14);

        Ok((
            Box::new(NativeFactorization { lu, singular }),
            SolveInfo {
                solver_name: "nalgebra-LU".to_string(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triplets(n: usize, entries: &[(usize, usize, f64)]) -> SparseTripletsF64 {
        SparseTripletsF64 {
            nrows: n,
            ncols: n,
            row_indices: entries.iter().map(|e| e.0).collect(),
            col_indices: entries.iter().map(|e| e.1).collect(),
            values: entries.iter().map(|e| e.2).collect(),
        }
    }

    #[test]
    fn native_solve_trivial() {
        // [2 0; 0 3] * [x; y] = [4; 9] -> x = 2, y = 3
        let backend = NativeBackend;
        let m = triplets(2, &[(0, 0, 2.0), (1, 1, 3.0)]);
        let (fact, info) = backend.factorize(&m).unwrap();
        let u = fact.solve(&DVector::from_vec(vec![4.0, 9.0])).unwrap();
        assert!((u[0] - 2.0).abs() < 1e-12);
        assert!((u[1] - 3.0).abs() < 1e-12);
        assert_eq!(info.solver_name, "nalgebra-LU");
    }

    #[test]
    fn factorization_serves_multiple_rhs() {
        let backend = NativeBackend;
        let m = triplets(
            3,
            &[
                (0, 0, 4.0),
                (0, 1, -1.0),
                (1, 0, -1.0),
                (1, 1, 4.0),
                (1, 2, -1.0),
                (2, 1, -1.0),
                (2, 2, 4.0),
            ],
        );
        let (fact, _) = backend.factorize(&m).unwrap();
        let u1 = fact.solve(&DVector::from_vec(vec![1.0, 2.0, 1.0])).unwrap();
        let u2 = fact.solve(&DVector::from_vec(vec![0.0, 1.0, 0.0])).unwrap();
        // Verify both solutions against K * u = f.
        let k = DMatrix::from_row_slice(
            3,
            3,
            &[4.0, -1.0, 0.0, -1.0, 4.0, -1.0, 0.0, -1.0, 4.0],
        );
        let f1 = &k * &u1;
        let f2 = &k * &u2;
        for i in 0..3 {
            assert!((f1[i] - [1.0, 2.0, 1.0][i]).abs() < 1e-10);
            assert!((f2[i] - [0.0, 1.0, 0.0][i]).abs() < 1e-10);
        }
    }

    #[test]
    fn duplicate_triplets_accumulate() {
        let backend = NativeBackend;
        let m = triplets(1, &[(0, 0, 1.0), (0, 0, 1.0)]);
        let (fact, _) = backend.factorize(&m).unwrap();
        let u = fact.solve(&DVector::from_vec(vec![4.0])).unwrap();
        assert!((u[0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn singular_matrix_reports_none() {
        let backend = NativeBackend;
        let m = triplets(2, &[(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 1.0)]);
        let (fact, _) = backend.factorize(&m).unwrap();
        assert!(fact.solve(&DVector::from_vec(vec![1.0, 0.0])).is_none());
    }
}
