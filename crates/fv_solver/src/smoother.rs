// crates/fv_solver/src/smoother.rs

//! Gauss-Seidel 光顺器族
//!
//! 廉价的原位松弛算子：一次扫描按地址序遍历全部单元，行内使用
//! 同一扫描中已更新的邻居值（经典 Gauss-Seidel，非 Jacobi）。
//! 光顺器内部不做收敛判断，扫描次数由调用方决定。
//!
//! 既可经 `smoothSolver` 单独作为廉价求解器使用，也作为多重网格
//! 的前/后光顺器。
//!
//! # 光顺器类型
//!
//! - [`GaussSeidelSmoother`]: 前向扫描
//! - [`SymGaussSeidelSmoother`]: 每次扫描 = 一次前向 + 一次后向

use fv_foundation::SolverScalar;

use crate::matrix::LduMatrix;

/// 光顺器 trait
///
/// `smooth` 对 x 原位执行 `sweeps` 次松弛扫描。
/// 不变量：矩阵对角元非零（由装配层与预条件构造检查保证）。
pub trait Smoother<S: SolverScalar>: Send + Sync {
    /// 原位松弛 `sweeps` 次
    fn smooth(&self, matrix: &LduMatrix<S>, x: &mut [S], b: &[S], sweeps: usize);

    /// 获取光顺器名称
    fn name(&self) -> &'static str;
}

/// 一次前向 Gauss-Seidel 扫描
fn forward_sweep<S: SolverScalar>(matrix: &LduMatrix<S>, x: &mut [S], b: &[S]) {
    let addr = matrix.addressing();
    let owner = addr.owner();
    let neighbour = addr.neighbour();
    let diag = matrix.diag();
    let upper = matrix.upper();
    let lower = matrix.lower();

    for i in 0..addr.n_cells() {
        let mut sum = b[i];
        for &f in addr.neighbour_faces(i) {
            sum -= lower[f] * x[owner[f]];
        }
        for &f in addr.owner_faces(i) {
            sum -= upper[f] * x[neighbour[f]];
        }
        x[i] = sum / diag[i];
    }
}

/// 一次后向 Gauss-Seidel 扫描
fn backward_sweep<S: SolverScalar>(matrix: &LduMatrix<S>, x: &mut [S], b: &[S]) {
    let addr = matrix.addressing();
    let owner = addr.owner();
    let neighbour = addr.neighbour();
    let diag = matrix.diag();
    let upper = matrix.upper();
    let lower = matrix.lower();

    for i in (0..addr.n_cells()).rev() {
        let mut sum = b[i];
        for &f in addr.neighbour_faces(i) {
            sum -= lower[f] * x[owner[f]];
        }
        for &f in addr.owner_faces(i) {
            sum -= upper[f] * x[neighbour[f]];
        }
        x[i] = sum / diag[i];
    }
}

/// 前向 Gauss-Seidel 光顺器
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussSeidelSmoother;

impl GaussSeidelSmoother {
    /// 创建前向 Gauss-Seidel 光顺器
    pub fn new() -> Self {
        Self
    }
}

impl<S: SolverScalar> Smoother<S> for GaussSeidelSmoother {
    fn smooth(&self, matrix: &LduMatrix<S>, x: &mut [S], b: &[S], sweeps: usize) {
        debug_assert_eq!(x.len(), matrix.n_cells());
        debug_assert_eq!(b.len(), matrix.n_cells());
        for _ in 0..sweeps {
            forward_sweep(matrix, x, b);
        }
    }

    fn name(&self) -> &'static str {
        "GaussSeidel"
    }
}

/// 对称 Gauss-Seidel 光顺器
///
/// 每次扫描交替前向/后向，消除单向扫描的方向偏置。
#[derive(Debug, Clone, Copy, Default)]
pub struct SymGaussSeidelSmoother;

impl SymGaussSeidelSmoother {
    /// 创建对称 Gauss-Seidel 光顺器
    pub fn new() -> Self {
        Self
    }
}

impl<S: SolverScalar> Smoother<S> for SymGaussSeidelSmoother {
    fn smooth(&self, matrix: &LduMatrix<S>, x: &mut [S], b: &[S], sweeps: usize) {
        debug_assert_eq!(x.len(), matrix.n_cells());
        debug_assert_eq!(b.len(), matrix.n_cells());
        for _ in 0..sweeps {
            forward_sweep(matrix, x, b);
            backward_sweep(matrix, x, b);
        }
    }

    fn name(&self) -> &'static str {
        "symGaussSeidel"
    }
}
