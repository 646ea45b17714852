// crates/fv_solver/src/solver/smooth.rs

//! 光顺器迭代求解器（smoothSolver）
//!
//! 把 Gauss-Seidel 族光顺器包装进标准停机条件框架：每 `nSweeps`
//! 次扫描检查一次归一化残差。适合对角占优、精度要求不高的
//! 标量输运方程，构造开销几乎为零。

use fv_foundation::{FvError, FvResult, SolverScalar};

use crate::matrix::LduMatrix;
use crate::registry::SmootherCtor;

use super::{normalisation_factor, residual_norm, LinearSolver, SolveContext, SolverControls, SolverPerformance};

/// 光顺器迭代求解器
///
/// 每次扫描计为一次迭代；残差每 `n_sweeps` 次扫描检查一次。
#[derive(Debug)]
pub struct SmoothSolver<S: SolverScalar> {
    controls: SolverControls<S>,
    smoother_ctor: SmootherCtor<S>,
    n_sweeps: usize,
}

impl<S: SolverScalar> SmoothSolver<S> {
    /// 创建光顺器求解器
    ///
    /// `n_sweeps` 为两次残差检查之间的扫描次数（至少为 1）。
    pub fn new(
        controls: SolverControls<S>,
        smoother_ctor: SmootherCtor<S>,
        n_sweeps: usize,
    ) -> Self {
        Self {
            controls,
            smoother_ctor,
            n_sweeps: n_sweeps.max(1),
        }
    }
}

impl<S: SolverScalar> LinearSolver<S> for SmoothSolver<S> {
    fn solve(
        &self,
        matrix: &LduMatrix<S>,
        x: &mut [S],
        ctx: &SolveContext<'_, S>,
    ) -> FvResult<SolverPerformance<S>> {
        let n = matrix.n_cells();
        FvError::check_size("x", n, x.len())?;
        matrix.check_finite()?;

        let b = matrix.source();
        let comm = ctx.comm;
        let smoother = (self.smoother_ctor)();
        let mut perf = SolverPerformance::new("smoothSolver", ctx.field_name);

        let mut w = vec![S::ZERO; n];
        let mut r = vec![S::ZERO; n];

        matrix.amul(x, &mut w)?;
        for i in 0..n {
            r[i] = b[i] - w[i];
        }

        let norm_factor = normalisation_factor(matrix, x, b, &w, comm, self.controls.norm);
        perf.record_initial(residual_norm(&r, norm_factor, comm));

        if perf.check_convergence(&self.controls) {
            return Ok(perf);
        }

        let mut iter = 0;
        while iter < self.controls.max_iter {
            let sweeps = self.n_sweeps.min(self.controls.max_iter - iter);
            smoother.smooth(matrix, x, b, sweeps);
            iter += sweeps;

            matrix.residual(x, b, &mut r)?;
            perf.n_iterations = iter;
            perf.record(residual_norm(&r, norm_factor, comm));
            log::trace!(
                "smoothSolver[{}] sweep {}: residual = {:e}",
                ctx.field_name,
                iter,
                perf.final_residual
            );

            if perf.check_convergence(&self.controls) {
                break;
            }
        }

        Ok(perf)
    }

    fn name(&self) -> &'static str {
        "smoothSolver"
    }
}
