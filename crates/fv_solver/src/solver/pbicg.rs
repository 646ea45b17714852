// crates/fv_solver/src/solver/pbicg.rs

//! 预条件双共轭梯度法（PBiCG）
//!
//! 求解非对称稀疏线性系统 Ax = b。在 CG 的基础上引入影子残差 r̃，
//! 其递推使用转置乘积 Aᵀ 与转置预条件 M⁻ᵀ：
//!
//! 1. r₀ = b - A·x₀, r̃₀ = r₀
//! 2. 对于 k = 0, 1, 2, ...
//!    - z = M⁻¹·r, z̃ = M⁻ᵀ·r̃
//!    - β = (z, r̃) / (z, r̃)_old，p = z + β·p，p̃ = z̃ + β·p̃
//!    - α = (z, r̃) / (A·p, p̃)
//!    - x += α·p，r -= α·A·p，r̃ -= α·Aᵀ·p̃
//!
//! 任一内积下溢为零即为双正交化崩溃：置奇异标志，返回当前最优解，
//! 由调用方决定换预条件器或缩小时间步重试。

use fv_foundation::{FvError, FvResult, SolverScalar};

use crate::matrix::LduMatrix;
use crate::registry::PrecondCtor;
use crate::vector_ops::{axpy, copy, dot};

use super::{normalisation_factor, residual_norm, LinearSolver, SolveContext, SolverControls, SolverPerformance};

/// 预条件双共轭梯度求解器
///
/// 适用于非对称矩阵；对称矩阵上与 PCG 等价但每次迭代开销翻倍。
#[derive(Debug)]
pub struct PbicgSolver<S: SolverScalar> {
    controls: SolverControls<S>,
    precond_ctor: PrecondCtor<S>,
}

impl<S: SolverScalar> PbicgSolver<S> {
    /// 创建 PBiCG 求解器
    pub fn new(controls: SolverControls<S>, precond_ctor: PrecondCtor<S>) -> Self {
        Self {
            controls,
            precond_ctor,
        }
    }
}

impl<S: SolverScalar> LinearSolver<S> for PbicgSolver<S> {
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
        let precond = (self.precond_ctor)(matrix)?;
        let mut perf = SolverPerformance::new("PBiCG", ctx.field_name);

        // w_a/w_t 先后充当预条件输出与矩阵乘积缓冲
        let mut w_a = vec![S::ZERO; n];
        let mut w_t = vec![S::ZERO; n];
        let mut r_a = vec![S::ZERO; n];
        let mut r_t = vec![S::ZERO; n];
        let mut p_a = vec![S::ZERO; n];
        let mut p_t = vec![S::ZERO; n];

        // r = b - A·x，影子残差初始化为 r 的副本
        matrix.amul(x, &mut w_a)?;
        for i in 0..n {
            r_a[i] = b[i] - w_a[i];
        }
        copy(&r_a, &mut r_t);

        let norm_factor = normalisation_factor(matrix, x, b, &w_a, comm, self.controls.norm);
        perf.record_initial(residual_norm(&r_a, norm_factor, comm));

        if perf.check_convergence(&self.controls) {
            return Ok(perf);
        }

        let mut w_ar_t_old = S::ZERO;

        for iter in 0..self.controls.max_iter {
            // z = M⁻¹·r, z̃ = M⁻ᵀ·r̃
            precond.precondition(&r_a, &mut w_a);
            precond.precondition_transpose(&r_t, &mut w_t);

            let w_ar_t = comm.sum(dot(&w_a, &r_t));
            if w_ar_t.abs() < S::VSMALL {
                perf.singular = true;
                break;
            }

            if iter == 0 {
                copy(&w_a, &mut p_a);
                copy(&w_t, &mut p_t);
            } else {
                let beta = w_ar_t / w_ar_t_old;
                for i in 0..n {
                    p_a[i] = w_a[i] + beta * p_a[i];
                    p_t[i] = w_t[i] + beta * p_t[i];
                }
            }

            // w = A·p, w̃ = Aᵀ·p̃
            matrix.amul(&p_a, &mut w_a)?;
            matrix.tmul(&p_t, &mut w_t)?;

            let w_ap_t = comm.sum(dot(&w_a, &p_t));
            if w_ap_t.abs() < S::VSMALL {
                perf.singular = true;
                break;
            }

            let alpha = w_ar_t / w_ap_t;
            axpy(alpha, &p_a, x);
            axpy(-alpha, &w_a, &mut r_a);
            axpy(-alpha, &w_t, &mut r_t);

            perf.n_iterations = iter + 1;
            perf.record(residual_norm(&r_a, norm_factor, comm));
            log::trace!(
                "PBiCG[{}] iter {}: residual = {:e}",
                ctx.field_name,
                iter + 1,
                perf.final_residual
            );

            if perf.check_convergence(&self.controls) {
                break;
            }

            w_ar_t_old = w_ar_t;
        }

        Ok(perf)
    }

    fn name(&self) -> &'static str {
        "PBiCG"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::Addressing;
    use crate::preconditioner::{DiluPreconditioner, NonePreconditioner, Preconditioner};
    use std::sync::Arc;

    type S = f64;

    fn build_none(_m: &LduMatrix<S>) -> FvResult<Box<dyn Preconditioner<S>>> {
        Ok(Box::new(NonePreconditioner::new()))
    }

    fn build_dilu(m: &LduMatrix<S>) -> FvResult<Box<dyn Preconditioner<S>>> {
        Ok(Box::new(DiluPreconditioner::new(m)?))
    }

    /// 非对称对角占优三对角矩阵
    fn asym_tridiag(n: usize) -> LduMatrix<S> {
        let addr = Arc::new(
            Addressing::new(n, (0..n - 1).collect(), (1..n).collect()).unwrap(),
        );
        let mut m = LduMatrix::new(addr);
        for i in 0..n {
            m.add_to_diag(i, 5.0).unwrap();
            m.add_to_source(i, (i as f64 + 1.0).sin()).unwrap();
        }
        for f in 0..n - 1 {
            m.add_to_upper(f, -1.0).unwrap();
        }
        for f in 0..n - 1 {
            m.add_to_lower(f, -1.0).unwrap();
        }
        m
    }

    #[test]
    fn test_pbicg_asymmetric_converges() {
        let m = asym_tridiag(8);
        let mut x = vec![0.0; 8];
        let solver = PbicgSolver::new(SolverControls::new(1e-12, 0.0, 100), build_none);
        let perf = solver.solve(&m, &mut x, &SolveContext::serial("U")).unwrap();
        assert!(perf.converged);

        // 验证残差确实小
        let mut r = vec![0.0; 8];
        m.residual(&x, m.source(), &mut r).unwrap();
        let res: f64 = r.iter().map(|v| v.abs()).sum();
        assert!(res < 1e-10);
    }

    #[test]
    fn test_pbicg_dilu_not_slower_than_none() {
        let m = asym_tridiag(20);

        let mut x1 = vec![0.0; 20];
        let s1 = PbicgSolver::new(SolverControls::new(1e-12, 0.0, 200), build_none);
        let p1 = s1.solve(&m, &mut x1, &SolveContext::serial("U")).unwrap();

        let mut x2 = vec![0.0; 20];
        let s2 = PbicgSolver::new(SolverControls::new(1e-12, 0.0, 200), build_dilu);
        let p2 = s2.solve(&m, &mut x2, &SolveContext::serial("U")).unwrap();

        assert!(p1.converged && p2.converged);
        assert!(p2.n_iterations <= p1.n_iterations);
    }

    #[test]
    fn test_pbicg_idempotent_on_converged_system() {
        let m = asym_tridiag(5);
        // 先解一遍得到精确解
        let mut x = vec![0.0; 5];
        let solver = PbicgSolver::new(SolverControls::new(1e-14, 0.0, 100), build_dilu);
        solver.solve(&m, &mut x, &SolveContext::serial("U")).unwrap();

        let x_before = x.clone();
        let perf = solver.solve(&m, &mut x, &SolveContext::serial("U")).unwrap();
        assert!(perf.converged);
        assert_eq!(perf.n_iterations, 0);
        assert_eq!(x, x_before);
    }
}
