// crates/fv_solver/src/preconditioner.rs

//! 预条件器族
//!
//! 预条件器把残差变换为预条件修正量 z = M⁻¹·r，加速 Krylov
//! 求解器收敛。派生系数（对角倒数、不完全分解的修正对角）在
//! 构造时从矩阵系数计算一次；矩阵数值变化后必须重建。每次求解
//! 新建预条件器，杜绝过期状态。
//!
//! # 预条件器类型
//!
//! - [`NonePreconditioner`]: 恒等（基准参照）
//! - [`DiagonalPreconditioner`]: 对角预条件，z_i = r_i / A_ii
//! - [`DicPreconditioner`]: 对角化不完全 Cholesky（对称矩阵）
//! - [`DiluPreconditioner`]: 对角化不完全 LU（非对称矩阵）
//!
//! 按名称选型经由 [`SolverRegistry`](crate::registry::SolverRegistry)，
//! 未知名称报 `UnknownType` 并列出全部合法名称。

use std::sync::Arc;

use fv_foundation::{ensure, FvError, FvResult, SolverScalar};

use crate::addressing::Addressing;
use crate::matrix::LduMatrix;

/// 预条件器 trait
///
/// 核心操作是 `precondition`: z = M⁻¹·r。非对称变体另行实现
/// 转置应用，供 BiCG 的影子残差递推使用。
pub trait Preconditioner<S: SolverScalar>: Send + Sync {
    /// 应用预条件器: z = M⁻¹·r
    fn precondition(&self, r: &[S], z: &mut [S]);

    /// 应用转置预条件器: z = M⁻ᵀ·r
    ///
    /// 对称预条件器的默认实现与 `precondition` 相同。
    fn precondition_transpose(&self, r: &[S], z: &mut [S]) {
        self.precondition(r, z);
    }

    /// 矩阵数值变化（结构不变）后重算派生系数
    ///
    /// 选型路径每次求解新建预条件器，无需调用；长期持有
    /// 预条件器的调用方在系数更新后必须调用，否则状态过期。
    fn update(&mut self, matrix: &LduMatrix<S>) -> FvResult<()>;

    /// 获取预条件器名称
    fn name(&self) -> &'static str;
}

// =============================================================================
// 恒等预条件器
// =============================================================================

/// 恒等预条件器（无预条件）
///
/// M = I，即 z = r。作为收敛速度基准。
#[derive(Debug, Clone, Default)]
pub struct NonePreconditioner;

impl NonePreconditioner {
    /// 创建恒等预条件器
    pub fn new() -> Self {
        Self
    }
}

impl<S: SolverScalar> Preconditioner<S> for NonePreconditioner {
    fn precondition(&self, r: &[S], z: &mut [S]) {
        z.copy_from_slice(r);
    }

    fn update(&mut self, _matrix: &LduMatrix<S>) -> FvResult<()> {
        // 恒等预条件器无派生状态
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

// =============================================================================
// 对角预条件器
// =============================================================================

/// 对角预条件器
///
/// M = diag(A)，即 z_i = r_i / A_ii。开销极低，适用于对角占优矩阵。
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner<S: SolverScalar> {
    /// 对角元素的倒数
    inv_diag: Vec<S>,
}

impl<S: SolverScalar> DiagonalPreconditioner<S> {
    /// 从矩阵创建对角预条件器
    ///
    /// # 错误
    ///
    /// 任一对角元恰为零时返回 `SingularMatrix`。
    pub fn new(matrix: &LduMatrix<S>) -> FvResult<Self> {
        let mut inv_diag = Vec::with_capacity(matrix.n_cells());
        for (i, &d) in matrix.diag().iter().enumerate() {
            ensure!(d != S::ZERO, FvError::singular(i));
            inv_diag.push(S::ONE / d);
        }
        Ok(Self { inv_diag })
    }

    /// 从矩阵创建，零对角元退化为恒等（覆盖奇异检查）
    pub fn new_with_fallback(matrix: &LduMatrix<S>) -> Self {
        let inv_diag = matrix
            .diag()
            .iter()
            .map(|&d| if d == S::ZERO { S::ONE } else { S::ONE / d })
            .collect();
        Self { inv_diag }
    }
}

impl<S: SolverScalar> Preconditioner<S> for DiagonalPreconditioner<S> {
    fn precondition(&self, r: &[S], z: &mut [S]) {
        debug_assert_eq!(r.len(), self.inv_diag.len());
        for ((zi, &ri), &inv_d) in z.iter_mut().zip(r.iter()).zip(self.inv_diag.iter()) {
            *zi = ri * inv_d;
        }
    }

    fn update(&mut self, matrix: &LduMatrix<S>) -> FvResult<()> {
        *self = Self::new(matrix)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "diagonal"
    }
}

// =============================================================================
// 不完全分解公共部分
// =============================================================================

/// 计算对角化不完全分解的修正对角倒数
///
/// 一次前向扫描: rd[nei[f]] -= upper[f]·lower[f] / rd[own[f]]，
/// 末尾整体取倒数。对称情形传 lower = upper。
fn reciprocal_modified_diag<S: SolverScalar>(
    addr: &Addressing,
    diag: &[S],
    upper: &[S],
    lower: &[S],
) -> FvResult<Vec<S>> {
    let owner = addr.owner();
    let neighbour = addr.neighbour();

    let mut rd = diag.to_vec();
    for f in 0..addr.n_faces() {
        let o = owner[f];
        ensure!(rd[o].abs() > S::VSMALL, FvError::singular(o));
        let rd_o = rd[o];
        rd[neighbour[f]] -= upper[f] * lower[f] / rd_o;
    }
    for (i, d) in rd.iter_mut().enumerate() {
        ensure!(d.abs() > S::VSMALL, FvError::singular(i));
        *d = S::ONE / *d;
    }
    Ok(rd)
}

// =============================================================================
// DIC 预条件器
// =============================================================================

/// 对角化不完全 Cholesky 预条件器（对称矩阵）
///
/// 构造时一次前向扫描得到修正对角，应用时沿地址序做
/// 前向/后向替换。比对角预条件更强，开销仍为 O(面数)。
#[derive(Debug, Clone)]
pub struct DicPreconditioner<S: SolverScalar> {
    addr: Arc<Addressing>,
    /// 上三角系数（构造时复制，矩阵变化后须重建）
    upper: Vec<S>,
    /// 修正对角的倒数
    rd: Vec<S>,
}

impl<S: SolverScalar> DicPreconditioner<S> {
    /// 从对称矩阵创建 DIC 预条件器
    ///
    /// # 错误
    ///
    /// - `Config`: 矩阵为非对称存储
    /// - `SingularMatrix`: 分解过程中主元为零
    pub fn new(matrix: &LduMatrix<S>) -> FvResult<Self> {
        ensure!(
            matrix.is_symmetric(),
            FvError::config("DIC 预条件器仅适用于对称矩阵，非对称系统请使用 DILU")
        );
        let addr = matrix.addressing().clone();
        let rd = reciprocal_modified_diag(&addr, matrix.diag(), matrix.upper(), matrix.upper())?;
        Ok(Self {
            addr,
            upper: matrix.upper().to_vec(),
            rd,
        })
    }
}

impl<S: SolverScalar> Preconditioner<S> for DicPreconditioner<S> {
    fn precondition(&self, r: &[S], z: &mut [S]) {
        debug_assert_eq!(r.len(), self.rd.len());
        let owner = self.addr.owner();
        let neighbour = self.addr.neighbour();
        let m = self.addr.n_faces();

        for ((zi, &ri), &rdi) in z.iter_mut().zip(r.iter()).zip(self.rd.iter()) {
            *zi = ri * rdi;
        }
        for f in 0..m {
            z[neighbour[f]] -= self.rd[neighbour[f]] * self.upper[f] * z[owner[f]];
        }
        for f in (0..m).rev() {
            z[owner[f]] -= self.rd[owner[f]] * self.upper[f] * z[neighbour[f]];
        }
    }

    fn update(&mut self, matrix: &LduMatrix<S>) -> FvResult<()> {
        *self = Self::new(matrix)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DIC"
    }
}

// =============================================================================
// DILU 预条件器
// =============================================================================

/// 对角化不完全 LU 预条件器（非对称矩阵）
///
/// 前向替换使用下三角，后向替换使用上三角；转置应用时两者互换。
#[derive(Debug, Clone)]
pub struct DiluPreconditioner<S: SolverScalar> {
    addr: Arc<Addressing>,
    upper: Vec<S>,
    lower: Vec<S>,
    /// 修正对角的倒数
    rd: Vec<S>,
}

impl<S: SolverScalar> DiluPreconditioner<S> {
    /// 从矩阵创建 DILU 预条件器
    ///
    /// 对称矩阵也可使用（退化为 DIC）。
    ///
    /// # 错误
    ///
    /// `SingularMatrix`: 分解过程中主元为零
    pub fn new(matrix: &LduMatrix<S>) -> FvResult<Self> {
        let addr = matrix.addressing().clone();
        let rd = reciprocal_modified_diag(&addr, matrix.diag(), matrix.upper(), matrix.lower())?;
        Ok(Self {
            addr,
            upper: matrix.upper().to_vec(),
            lower: matrix.lower().to_vec(),
            rd,
        })
    }
}

impl<S: SolverScalar> Preconditioner<S> for DiluPreconditioner<S> {
    fn precondition(&self, r: &[S], z: &mut [S]) {
        debug_assert_eq!(r.len(), self.rd.len());
        let owner = self.addr.owner();
        let neighbour = self.addr.neighbour();
        let m = self.addr.n_faces();

        for ((zi, &ri), &rdi) in z.iter_mut().zip(r.iter()).zip(self.rd.iter()) {
            *zi = ri * rdi;
        }
        for f in 0..m {
            z[neighbour[f]] -= self.rd[neighbour[f]] * self.lower[f] * z[owner[f]];
        }
        for f in (0..m).rev() {
            z[owner[f]] -= self.rd[owner[f]] * self.upper[f] * z[neighbour[f]];
        }
    }

    fn precondition_transpose(&self, r: &[S], z: &mut [S]) {
        debug_assert_eq!(r.len(), self.rd.len());
        let owner = self.addr.owner();
        let neighbour = self.addr.neighbour();
        let m = self.addr.n_faces();

        for ((zi, &ri), &rdi) in z.iter_mut().zip(r.iter()).zip(self.rd.iter()) {
            *zi = ri * rdi;
        }
        for f in 0..m {
            z[neighbour[f]] -= self.rd[neighbour[f]] * self.upper[f] * z[owner[f]];
        }
        for f in (0..m).rev() {
            z[owner[f]] -= self.rd[owner[f]] * self.lower[f] * z[neighbour[f]];
        }
    }

    fn update(&mut self, matrix: &LduMatrix<S>) -> FvResult<()> {
        *self = Self::new(matrix)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DILU"
    }
}
