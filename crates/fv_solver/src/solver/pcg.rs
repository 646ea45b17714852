// crates/fv_solver/src/solver/pcg.rs

//! 预条件共轭梯度法（PCG）
//!
//! 求解对称正定稀疏线性系统 Ax = b。基本迭代格式：
//!
//! 1. r₀ = b - A·x₀
//! 2. 对于 k = 0, 1, 2, ...
//!    - z_k = M⁻¹·r_k
//!    - β_k = (r_k, z_k) / (r_{k-1}, z_{k-1})（首次迭代 β = 0）
//!    - p_k = z_k + β_k·p_{k-1}
//!    - α_k = (r_k, z_k) / (p_k, A·p_k)
//!    - x_{k+1} = x_k + α_k·p_k, r_{k+1} = r_k - α_k·A·p_k
//!
//! 步长内积经全局归约，是区域分解下仅有的同步点之一。
//! 内积下溢为零（崩溃）置奇异标志并返回当前最优解。

use fv_foundation::{ensure, FvError, FvResult, SolverScalar};

use crate::matrix::LduMatrix;
use crate::registry::PrecondCtor;
use crate::vector_ops::{axpy, copy, dot};

use super::{normalisation_factor, residual_norm, LinearSolver, SolveContext, SolverControls, SolverPerformance};

/// 预条件共轭梯度求解器
///
/// 仅适用于对称矩阵。预条件器在每次 `solve` 入口从当前矩阵
/// 系数新建，不存在过期状态。
#[derive(Debug)]
pub struct PcgSolver<S: SolverScalar> {
    controls: SolverControls<S>,
    precond_ctor: PrecondCtor<S>,
}

impl<S: SolverScalar> PcgSolver<S> {
    /// 创建 PCG 求解器
    pub fn new(controls: SolverControls<S>, precond_ctor: PrecondCtor<S>) -> Self {
        Self {
            controls,
            precond_ctor,
        }
    }
}

impl<S: SolverScalar> LinearSolver<S> for PcgSolver<S> {
    fn solve(
        &self,
        matrix: &LduMatrix<S>,
        x: &mut [S],
        ctx: &SolveContext<'_, S>,
    ) -> FvResult<SolverPerformance<S>> {
        let n = matrix.n_cells();
        FvError::check_size("x", n, x.len())?;
        ensure!(
            matrix.is_symmetric(),
            FvError::config("PCG 仅适用于对称矩阵，非对称系统请使用 PBiCG")
        );
        matrix.check_finite()?;

        let b = matrix.source();
        let comm = ctx.comm;
        let precond = (self.precond_ctor)(matrix)?;
        let mut perf = SolverPerformance::new("PCG", ctx.field_name);

        let mut w = vec![S::ZERO; n]; // A·p 缓冲
        let mut r = vec![S::ZERO; n];
        let mut z = vec![S::ZERO; n];
        let mut p = vec![S::ZERO; n];

        // r = b - A·x
        matrix.amul(x, &mut w)?;
        for i in 0..n {
            r[i] = b[i] - w[i];
        }

        let norm_factor = normalisation_factor(matrix, x, b, &w, comm, self.controls.norm);
        perf.record_initial(residual_norm(&r, norm_factor, comm));

        // 已收敛的系统立即返回，迭代数为 0，解不变
        if perf.check_convergence(&self.controls) {
            return Ok(perf);
        }

        let mut w_ar_a_old = S::ZERO;

        for iter in 0..self.controls.max_iter {
            // z = M⁻¹·r
            precond.precondition(&r, &mut z);

            let w_ar_a = comm.sum(dot(&z, &r));
            if w_ar_a.abs() < S::VSMALL {
                perf.singular = true;
                break;
            }

            // p = z + β·p
            if iter == 0 {
                copy(&z, &mut p);
            } else {
                let beta = w_ar_a / w_ar_a_old;
                for i in 0..n {
                    p[i] = z[i] + beta * p[i];
                }
            }

            // w = A·p
            matrix.amul(&p, &mut w)?;

            let w_ap_a = comm.sum(dot(&w, &p));
            if w_ap_a.abs() < S::VSMALL {
                perf.singular = true;
                break;
            }

            let alpha = w_ar_a / w_ap_a;
            axpy(alpha, &p, x);
            axpy(-alpha, &w, &mut r);

            perf.n_iterations = iter + 1;
            perf.record(residual_norm(&r, norm_factor, comm));
            log::trace!(
                "PCG[{}] iter {}: residual = {:e}",
                ctx.field_name,
                iter + 1,
                perf.final_residual
            );

            if perf.check_convergence(&self.controls) {
                break;
            }

            w_ar_a_old = w_ar_a;
        }

        Ok(perf)
    }

    fn name(&self) -> &'static str {
        "PCG"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::Addressing;
    use crate::preconditioner::{DiagonalPreconditioner, NonePreconditioner, Preconditioner};
    use std::sync::Arc;

    type S = f64;

    fn build_none(_m: &LduMatrix<S>) -> FvResult<Box<dyn Preconditioner<S>>> {
        Ok(Box::new(NonePreconditioner::new()))
    }

    fn build_diagonal(m: &LduMatrix<S>) -> FvResult<Box<dyn Preconditioner<S>>> {
        Ok(Box::new(DiagonalPreconditioner::new(m)?))
    }

    fn tridiag3_with_b() -> LduMatrix<S> {
        let addr = Arc::new(Addressing::new(3, vec![0, 1], vec![1, 2]).unwrap());
        let mut m = LduMatrix::new(addr);
        for i in 0..3 {
            m.add_to_diag(i, 4.0).unwrap();
            m.add_to_source(i, 1.0).unwrap();
        }
        for f in 0..2 {
            m.add_to_upper(f, -1.0).unwrap();
        }
        m
    }

    #[test]
    fn test_pcg_tridiag_scenario() {
        // [[4,-1,0],[-1,4,-1],[0,-1,4]]·x = [1,1,1]，容差 1e-10，
        // 至多 3 次迭代收敛到 x ≈ [0.3571, 0.4286, 0.3571]
        let m = tridiag3_with_b();
        let mut x = vec![0.0; 3];
        let solver = PcgSolver::new(SolverControls::new(1e-10, 0.0, 100), build_none);
        let perf = solver.solve(&m, &mut x, &SolveContext::serial("p")).unwrap();

        assert!(perf.converged);
        assert!(perf.n_iterations <= 3);
        assert!((x[0] - 0.3571).abs() < 1e-4);
        assert!((x[1] - 0.4286).abs() < 1e-4);
        assert!((x[2] - 0.3571).abs() < 1e-4);
    }

    #[test]
    fn test_pcg_already_converged_is_idempotent() {
        // 传入精确解：0 次迭代、收敛、解不变
        let m = tridiag3_with_b();
        let exact = vec![5.0 / 14.0, 3.0 / 7.0, 5.0 / 14.0];
        let mut x = exact.clone();
        let solver = PcgSolver::new(SolverControls::new(1e-8, 0.0, 100), build_diagonal);
        let perf = solver.solve(&m, &mut x, &SolveContext::serial("p")).unwrap();

        assert!(perf.converged);
        assert_eq!(perf.n_iterations, 0);
        assert_eq!(x, exact);
    }

    #[test]
    fn test_pcg_rejects_asymmetric() {
        let mut m = tridiag3_with_b();
        m.add_to_lower(0, -0.5).unwrap();
        let mut x = vec![0.0; 3];
        let solver = PcgSolver::new(SolverControls::new(1e-10, 0.0, 100), build_none);
        let err = solver
            .solve(&m, &mut x, &SolveContext::serial("p"))
            .unwrap_err();
        assert!(matches!(err, FvError::Config { .. }));
    }

    #[test]
    fn test_pcg_max_iter_reports_not_converged() {
        let m = tridiag3_with_b();
        let mut x = vec![0.0; 3];
        let solver = PcgSolver::new(SolverControls::new(1e-30, 0.0, 1), build_none);
        let perf = solver.solve(&m, &mut x, &SolveContext::serial("p")).unwrap();

        assert!(!perf.converged);
        assert!(!perf.singular);
        assert_eq!(perf.n_iterations, 1);
    }

    #[test]
    fn test_pcg_zero_matrix_breakdown() {
        // 全零矩阵：A·p = 0 使步长内积下溢，报告奇异而不是 panic
        let addr = Arc::new(Addressing::new(2, vec![0], vec![1]).unwrap());
        let mut m = LduMatrix::<S>::new(addr);
        m.add_to_source(0, 1.0).unwrap();
        m.add_to_source(1, 1.0).unwrap();

        let mut x = vec![0.0; 2];
        let solver = PcgSolver::new(SolverControls::new(1e-10, 0.0, 10), build_none);
        let perf = solver.solve(&m, &mut x, &SolveContext::serial("p")).unwrap();

        assert!(perf.singular);
        assert!(!perf.converged);
    }
}
