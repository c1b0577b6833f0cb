use nalgebra::{RealField, SMatrix, SVector, Scalar};

/// Gauss-Newton normal equations `H δ = -g` over `D` parameters.
pub(crate) struct NormalEquations<T: Scalar, const D: usize> {
    hessian: SMatrix<T, D, D>,
    gradient: SVector<T, D>,
}

impl<T: RealField + Copy, const D: usize> NormalEquations<T, D> {
    pub(crate) fn new() -> Self {
        Self {
            hessian: SMatrix::zeros(),
            gradient: SVector::zeros(),
        }
    }

    /// Adds `weight * residual^2` linearized as `residual + jacobian · δ`.
    pub(crate) fn add_residual(&mut self, jacobian: &SVector<T, D>, residual: T, weight: T) {
        self.hessian += jacobian * jacobian.transpose() * weight;
        self.gradient += jacobian * (residual * weight);
    }

    /// Returns `None` if the damped system is not positive definite.
    pub(crate) fn solve(mut self, damping: T) -> Option<SVector<T, D>> {
        for i in 0..D {
            self.hessian[(i, i)] += damping;
        }
        self.hessian
            .cholesky()
            .map(|cholesky| -cholesky.solve(&self.gradient))
    }
}
