// crates/fv_solver/src/solver/mod.rs

//! 迭代求解器框架
//!
//! 提供收敛控制、残差归一化、性能报告与求解器 trait，
//! 以及三个求解器实现：
//!
//! - [`PcgSolver`]: 预条件共轭梯度法（对称系统）
//! - [`PbicgSolver`]: 预条件双共轭梯度法（非对称系统）
//! - [`SmoothSolver`]: 光顺器迭代求解（廉价候补）
//!
//! # 停机条件
//!
//! 每次迭代按优先级检查：
//! 1. 归一化残差 ≤ 绝对容差 → 收敛
//! 2. 当前/初始残差 ≤ 相对容差 → 收敛
//! 3. 迭代数 ≥ 上限 → 不收敛（记录上报，不是错误）
//! 4. 内积下溢为零（崩溃）→ 奇异标志，返回当前最优解
//!
//! # 残差归一化
//!
//! 默认采用场尺度归一化：记 x̄ 为解的全局均值、s = A·1 为行和，
//! 归一化常数 = Σ|A·x − s·x̄| + Σ|b − s·x̄| + SMALL（L1 和经全局归约）。
//! 容差由此对网格规模不敏感。具体取法是启发式，可在字典中切换为
//! 右端项归一化（`norm: "rhs"`），不影响解的正确性。

mod pbicg;
mod pcg;
mod smooth;

pub use pbicg::PbicgSolver;
pub use pcg::PcgSolver;
pub use smooth::SmoothSolver;

use std::sync::Arc;

use fv_config::{NormKind, SolverDict};
use fv_foundation::{FvError, FvResult, SolverScalar};

use crate::coupling::{LocalReduction, Reduction};
use crate::matrix::LduMatrix;
use crate::multigrid::Agglomeration;
use crate::vector_ops::{sum, sum_mag};

// ============================================================================
// 收敛控制
// ============================================================================

/// 求解器收敛控制参数（已转换到目标精度）
#[derive(Debug, Clone)]
pub struct SolverControls<S: SolverScalar> {
    /// 绝对收敛容差（作用于归一化残差）
    pub tolerance: S,
    /// 相对收敛容差（当前残差/初始残差）
    pub rel_tol: S,
    /// 最大迭代次数
    pub max_iter: usize,
    /// 残差归一化方式
    pub norm: NormKind,
}

impl<S: SolverScalar> SolverControls<S> {
    /// 直接构造（归一化方式取默认）
    pub fn new(tolerance: S, rel_tol: S, max_iter: usize) -> Self {
        Self {
            tolerance,
            rel_tol,
            max_iter,
            norm: NormKind::default(),
        }
    }

    /// 从字典转换
    pub fn from_dict(dict: &SolverDict) -> FvResult<Self> {
        dict.validate()
            .map_err(|e| FvError::config(e.to_string()))?;
        let tolerance = S::from_config(dict.tolerance)
            .ok_or_else(|| FvError::invalid_config("tolerance", dict.tolerance.to_string(), "无法转换到目标精度"))?;
        let rel_tol = S::from_config(dict.rel_tol)
            .ok_or_else(|| FvError::invalid_config("relTol", dict.rel_tol.to_string(), "无法转换到目标精度"))?;
        Ok(Self {
            tolerance,
            rel_tol,
            max_iter: dict.max_iter,
            norm: dict.norm,
        })
    }
}

// ============================================================================
// 求解上下文
// ============================================================================

/// 求解调用的横切上下文
///
/// 携带场名、全局归约协作者与可选的缓存聚并层级。
pub struct SolveContext<'a, S: SolverScalar> {
    /// 待解场名称（日志与性能报告使用）
    pub field_name: &'a str,
    /// 全局归约原语
    pub comm: &'a dyn Reduction<S>,
    /// 缓存的聚并层级（仅多重网格求解器使用）
    pub agglomeration: Option<Arc<Agglomeration>>,
}

impl<'a, S: SolverScalar> SolveContext<'a, S> {
    /// 单进程上下文
    pub fn serial(field_name: &'a str) -> Self {
        Self {
            field_name,
            comm: &LocalReduction,
            agglomeration: None,
        }
    }

    /// 带归约协作者的上下文
    pub fn with_comm(field_name: &'a str, comm: &'a dyn Reduction<S>) -> Self {
        Self {
            field_name,
            comm,
            agglomeration: None,
        }
    }
}

// ============================================================================
// 性能报告
// ============================================================================

/// 一次线性求解的性能记录
///
/// 返回后不可变。不收敛与崩溃在此上报，调用方（外层压力-速度
/// 耦合循环等）据此自适应，不经由错误通道展开。
#[derive(Debug, Clone)]
pub struct SolverPerformance<S: SolverScalar> {
    /// 求解器名称
    pub solver_name: &'static str,
    /// 场名称
    pub field_name: String,
    /// 初始归一化残差
    pub initial_residual: S,
    /// 最终归一化残差
    pub final_residual: S,
    /// 迭代次数
    pub n_iterations: usize,
    /// 是否收敛
    pub converged: bool,
    /// 奇异标志（内积崩溃/对角近零）
    pub singular: bool,
    /// 残差历史（含初始残差）
    pub residuals: Vec<S>,
}

impl<S: SolverScalar> SolverPerformance<S> {
    /// 创建初始记录
    pub(crate) fn new(solver_name: &'static str, field_name: &str) -> Self {
        Self {
            solver_name,
            field_name: field_name.to_string(),
            initial_residual: S::ZERO,
            final_residual: S::ZERO,
            n_iterations: 0,
            converged: false,
            singular: false,
            residuals: Vec::new(),
        }
    }

    /// 记录一次残差（更新最终残差并写入历史）
    pub(crate) fn record(&mut self, residual: S) {
        self.final_residual = residual;
        self.residuals.push(residual);
    }

    /// 记录初始残差
    pub(crate) fn record_initial(&mut self, residual: S) {
        self.initial_residual = residual;
        self.record(residual);
    }

    /// 按停机条件优先级检查收敛，更新标志位
    pub(crate) fn check_convergence(&mut self, controls: &SolverControls<S>) -> bool {
        let res = self.final_residual;
        self.converged = res <= controls.tolerance
            || (controls.rel_tol > S::SMALL && res <= controls.rel_tol * self.initial_residual);
        self.converged
    }

    /// 输出求解摘要日志
    ///
    /// 不收敛的求解输出警告（带迭代数与残差），不中止程序。
    pub fn log_summary(&self) {
        if self.converged {
            log::info!(
                "{}: 求解 {}, 初始残差 = {:e}, 最终残差 = {:e}, 迭代 {} 次",
                self.solver_name,
                self.field_name,
                self.initial_residual,
                self.final_residual,
                self.n_iterations
            );
        } else if self.singular {
            log::warn!(
                "{}: 求解 {} 发生崩溃（奇异），迭代 {} 次后残差 = {:e}，返回当前最优解",
                self.solver_name,
                self.field_name,
                self.n_iterations,
                self.final_residual
            );
        } else {
            log::warn!(
                "{}: 求解 {} 未收敛，迭代 {} 次后残差 = {:e}（初始残差 {:e}）",
                self.solver_name,
                self.field_name,
                self.n_iterations,
                self.final_residual,
                self.initial_residual
            );
        }
    }
}

// ============================================================================
// 残差归一化
// ============================================================================

/// 计算残差归一化常数
///
/// `ax` 为当前解的矩阵-向量乘积（初始化阶段已算出，复用之）。
pub(crate) fn normalisation_factor<S: SolverScalar>(
    matrix: &LduMatrix<S>,
    x: &[S],
    b: &[S],
    ax: &[S],
    comm: &dyn Reduction<S>,
    kind: NormKind,
) -> S {
    match kind {
        NormKind::Rhs => comm.sum(sum_mag(b)) + S::SMALL,
        NormKind::Normalised => {
            let n_global = comm.sum(S::from_usize(x.len()).unwrap_or(S::ONE));
            let x_avg = comm.sum(sum(x)) / n_global;
            let row_sum = matrix.row_sum();

            let mut s_ax = S::ZERO;
            let mut s_b = S::ZERO;
            for i in 0..x.len() {
                let reference = row_sum[i] * x_avg;
                s_ax += (ax[i] - reference).abs();
                s_b += (b[i] - reference).abs();
            }
            comm.sum(s_ax) + comm.sum(s_b) + S::SMALL
        }
    }
}

/// 归一化残差范数（L1 和经全局归约）
pub(crate) fn residual_norm<S: SolverScalar>(
    r: &[S],
    norm_factor: S,
    comm: &dyn Reduction<S>,
) -> S {
    comm.sum(sum_mag(r)) / norm_factor
}

// ============================================================================
// 求解器 trait
// ============================================================================

/// 线性求解器 trait
///
/// 求解 A·x = b（b 为矩阵持有的源项），x 原位更新为解。
/// 求解期间矩阵只读；每次求解新建求解器实例。
pub trait LinearSolver<S: SolverScalar>: Send + Sync + std::fmt::Debug {
    /// 求解线性系统
    ///
    /// # 错误
    ///
    /// 仅装配期缺陷（尺寸不匹配、非有限系数、不适用的矩阵类型）
    /// 返回错误；不收敛与崩溃记录在返回的性能报告中。
    fn solve(
        &self,
        matrix: &LduMatrix<S>,
        x: &mut [S],
        ctx: &SolveContext<'_, S>,
    ) -> FvResult<SolverPerformance<S>>;

    /// 获取求解器名称
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::Addressing;

    type S = f64;

    fn tridiag3() -> LduMatrix<S> {
        let addr = Arc::new(Addressing::new(3, vec![0, 1], vec![1, 2]).unwrap());
        let mut m = LduMatrix::new(addr);
        for i in 0..3 {
            m.add_to_diag(i, 4.0).unwrap();
        }
        for f in 0..2 {
            m.add_to_upper(f, -1.0).unwrap();
        }
        m
    }

    #[test]
    fn test_controls_from_dict() {
        let dict = SolverDict::pcg("diagonal", 1e-9).with_rel_tol(0.05);
        let c = SolverControls::<S>::from_dict(&dict).unwrap();
        assert_eq!(c.tolerance, 1e-9);
        assert_eq!(c.rel_tol, 0.05);
        assert_eq!(c.max_iter, 1000);
    }

    #[test]
    fn test_controls_reject_invalid_dict() {
        let dict = SolverDict::pcg("diagonal", -1.0);
        assert!(SolverControls::<S>::from_dict(&dict).is_err());
    }

    #[test]
    fn test_check_convergence_priority() {
        let controls = SolverControls::<S>::new(1e-6, 0.1, 100);
        let mut perf = SolverPerformance::new("PCG", "p");
        perf.record_initial(1.0);
        assert!(!perf.check_convergence(&controls));

        // 相对容差命中
        perf.record(0.05);
        assert!(perf.check_convergence(&controls));

        // 绝对容差命中
        let mut perf = SolverPerformance::new("PCG", "p");
        perf.record_initial(1e-8);
        assert!(perf.check_convergence(&controls));
    }

    #[test]
    fn test_rel_tol_zero_disables_relative_check() {
        let controls = SolverControls::<S>::new(1e-12, 0.0, 100);
        let mut perf = SolverPerformance::new("PCG", "p");
        perf.record_initial(1.0);
        perf.record(1e-6);
        assert!(!perf.check_convergence(&controls));
    }

    #[test]
    fn test_normalisation_factor_zero_guess() {
        // x = 0 时归一化常数退化为 Σ|b| + SMALL，初始归一化残差 ≈ 1
        let m = tridiag3();
        let x = vec![0.0; 3];
        let b = vec![1.0, 2.0, 3.0];
        let ax = vec![0.0; 3];
        let comm = LocalReduction;
        let nf = normalisation_factor(&m, &x, &b, &ax, &comm, NormKind::Normalised);
        assert!((nf - 6.0).abs() < 1e-12);

        let mut r = vec![0.0; 3];
        m.residual(&x, &b, &mut r).unwrap();
        let res = residual_norm(&r, nf, &comm);
        assert!((res - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rhs_norm_factor() {
        let m = tridiag3();
        let x = vec![0.0; 3];
        let b = vec![1.0, -2.0, 3.0];
        let ax = vec![0.0; 3];
        let comm = LocalReduction;
        let nf = normalisation_factor(&m, &x, &b, &ax, &comm, NormKind::Rhs);
        assert!((nf - 6.0).abs() < 1e-12);
    }
}
