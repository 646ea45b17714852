// crates/fv_solver/src/vector_ops.rs

//! 向量运算（BLAS Level 1 风格）
//!
//! 迭代求解器内层循环使用的基础向量运算，泛型支持 f32/f64。
//!
//! # 函数列表
//!
//! - [`dot`]: 点积 x·y
//! - [`sum`]: 元素和
//! - [`sum_mag`]: L1 范数（绝对值和，残差归一化使用）
//! - [`norm2`]: L2 范数
//! - [`axpy`]: y = α*x + y
//! - [`copy`]: y = x
//! - [`fill`]: x[:] = α

use fv_foundation::SolverScalar;

/// 点积 x·y
#[inline]
pub fn dot<S: SolverScalar>(x: &[S], y: &[S]) -> S {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y.iter()).map(|(&xi, &yi)| xi * yi).sum()
}

/// 元素和
#[inline]
pub fn sum<S: SolverScalar>(x: &[S]) -> S {
    x.iter().copied().sum()
}

/// L1 范数（绝对值和）
///
/// 残差范数与归一化常数均使用 L1 和，使容差对网格规模不敏感。
#[inline]
pub fn sum_mag<S: SolverScalar>(x: &[S]) -> S {
    x.iter().map(|&v| v.abs()).sum()
}

/// L2 范数
#[inline]
pub fn norm2<S: SolverScalar>(x: &[S]) -> S {
    dot(x, x).sqrt()
}

/// AXPY: y = α*x + y
#[inline]
pub fn axpy<S: SolverScalar>(alpha: S, x: &[S], y: &mut [S]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x.iter()) {
        *yi += alpha * xi;
    }
}

/// 复制: y = x
#[inline]
pub fn copy<S: SolverScalar>(x: &[S], y: &mut [S]) {
    debug_assert_eq!(x.len(), y.len());
    y.copy_from_slice(x);
}

/// 填充: x[:] = α
#[inline]
pub fn fill<S: SolverScalar>(alpha: S, x: &mut [S]) {
    x.fill(alpha);
}
