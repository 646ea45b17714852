// crates/fv_solver/src/matrix.rs

//! LDU 稀疏矩阵
//!
//! 以对角/上三角/下三角三组系数数组存储稀疏矩阵，系数按
//! [`Addressing`] 的面序一一对齐。对称矩阵只存对角与上三角，
//! 下三角按转置读取。
//!
//! 每次方程组装生成一个矩阵，由调用方持有，求解返回后销毁。
//! 求解过程中矩阵只读（`&LduMatrix`），绝不原位修改。
//!
//! # 边界贡献
//!
//! 每个边界块记录 (单元列表, 对角贡献, 源项贡献)。求解入口把
//! 它们折叠进对角与源项（[`fold_boundary`](LduMatrix::fold_boundary)），
//! 求解结束后恢复。进程间耦合边界通过 [`InterfaceUpdate`] 挂钩
//! 在每次矩阵-向量乘积前后注入，乘积在挂钩返回前不算完成。
//!
//! # 矩阵-向量乘积约定
//!
//! 每条面 f 贡献 `upper[f]*x[neighbour[f]]` 到 owner 行、
//! `lower[f]*x[owner[f]]` 到 neighbour 行。

use std::sync::Arc;

use fv_foundation::{FvError, FvResult, SolverScalar};

use crate::addressing::Addressing;
use crate::coupling::InterfaceUpdate;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// =============================================================================
// 边界块
// =============================================================================

/// 单个边界块的系数对
///
/// `internal_coeffs` 在求解入口加到对应单元的对角元上，
/// `boundary_coeffs` 加到源项上。两组数组与 `cells` 一一对应。
#[derive(Debug, Clone)]
pub struct BoundaryPatch<S: SolverScalar> {
    /// 边界面邻接的内部单元
    cells: Vec<usize>,
    /// 对角贡献
    internal_coeffs: Vec<S>,
    /// 源项贡献
    boundary_coeffs: Vec<S>,
}

impl<S: SolverScalar> BoundaryPatch<S> {
    /// 创建零系数边界块
    pub fn new(cells: Vec<usize>) -> Self {
        let n = cells.len();
        Self {
            cells,
            internal_coeffs: vec![S::ZERO; n],
            boundary_coeffs: vec![S::ZERO; n],
        }
    }

    /// 从已有系数创建边界块
    ///
    /// # 错误
    ///
    /// 三组数组长度不一致时返回 `SizeMismatch`
    pub fn from_coeffs(
        cells: Vec<usize>,
        internal_coeffs: Vec<S>,
        boundary_coeffs: Vec<S>,
    ) -> FvResult<Self> {
        FvError::check_size("internal_coeffs", cells.len(), internal_coeffs.len())?;
        FvError::check_size("boundary_coeffs", cells.len(), boundary_coeffs.len())?;
        Ok(Self {
            cells,
            internal_coeffs,
            boundary_coeffs,
        })
    }

    /// 边界面数
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// 单元列表
    #[inline]
    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    /// 累加对角贡献（局部面索引）
    #[inline]
    pub fn add_internal(&mut self, face: usize, value: S) {
        self.internal_coeffs[face] += value;
    }

    /// 累加源项贡献（局部面索引）
    #[inline]
    pub fn add_boundary(&mut self, face: usize, value: S) {
        self.boundary_coeffs[face] += value;
    }
}

// =============================================================================
// 折叠保存
// =============================================================================

/// `fold_boundary` 保存的原始对角与源项，用于求解后恢复
#[derive(Debug, Clone)]
pub struct FoldedBoundary<S: SolverScalar> {
    diag: Vec<S>,
    source: Vec<S>,
}

// =============================================================================
// LDU 矩阵主体
// =============================================================================

/// LDU 格式稀疏矩阵
///
/// 泛型支持 f32/f64 精度。`lower` 为 `None` 时矩阵对称，
/// 下三角按上三角的转置读取。
#[derive(Clone)]
pub struct LduMatrix<S: SolverScalar> {
    /// 共享寻址（不可变）
    addr: Arc<Addressing>,
    /// 对角系数（长度 = 单元数）
    diag: Vec<S>,
    /// 上三角系数（长度 = 面数，owner 行、neighbour 列）
    upper: Vec<S>,
    /// 下三角系数；None 表示对称
    lower: Option<Vec<S>>,
    /// 源项（右端项）
    source: Vec<S>,
    /// 边界块
    patches: Vec<BoundaryPatch<S>>,
    /// 进程耦合边界挂钩
    interfaces: Vec<Arc<dyn InterfaceUpdate<S>>>,
}

impl<S: SolverScalar> LduMatrix<S> {
    /// 在给定寻址上构造零系数矩阵（对称存储）
    pub fn new(addr: Arc<Addressing>) -> Self {
        let n = addr.n_cells();
        let m = addr.n_faces();
        Self {
            addr,
            diag: vec![S::ZERO; n],
            upper: vec![S::ZERO; m],
            lower: None,
            source: vec![S::ZERO; n],
            patches: Vec::new(),
            interfaces: Vec::new(),
        }
    }

    /// 共享寻址
    #[inline]
    pub fn addressing(&self) -> &Arc<Addressing> {
        &self.addr
    }

    /// 单元数
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.addr.n_cells()
    }

    /// 面数
    #[inline]
    pub fn n_faces(&self) -> usize {
        self.addr.n_faces()
    }

    /// 是否对称存储
    #[inline]
    pub fn is_symmetric(&self) -> bool {
        self.lower.is_none()
    }

    /// 对角系数
    #[inline]
    pub fn diag(&self) -> &[S] {
        &self.diag
    }

    /// 可变对角系数
    #[inline]
    pub fn diag_mut(&mut self) -> &mut [S] {
        &mut self.diag
    }

    /// 上三角系数
    #[inline]
    pub fn upper(&self) -> &[S] {
        &self.upper
    }

    /// 可变上三角系数
    #[inline]
    pub fn upper_mut(&mut self) -> &mut [S] {
        &mut self.upper
    }

    /// 下三角系数（对称矩阵返回上三角）
    #[inline]
    pub fn lower(&self) -> &[S] {
        self.lower.as_deref().unwrap_or(&self.upper)
    }

    /// 可变下三角系数
    ///
    /// 对称矩阵首次调用时物化下三角（复制上三角），此后矩阵视为非对称。
    pub fn lower_mut(&mut self) -> &mut [S] {
        if self.lower.is_none() {
            self.lower = Some(self.upper.clone());
        }
        self.lower.as_mut().unwrap()
    }

    /// 源项
    #[inline]
    pub fn source(&self) -> &[S] {
        &self.source
    }

    /// 可变源项
    #[inline]
    pub fn source_mut(&mut self) -> &mut [S] {
        &mut self.source
    }

    /// 边界块列表
    #[inline]
    pub fn patches(&self) -> &[BoundaryPatch<S>] {
        &self.patches
    }

    /// 耦合边界挂钩列表
    #[inline]
    pub fn interfaces(&self) -> &[Arc<dyn InterfaceUpdate<S>>] {
        &self.interfaces
    }

    // =========================================================================
    // 累加接口（离散层组装使用）
    // =========================================================================

    /// 累加对角贡献
    pub fn add_to_diag(&mut self, cell: usize, value: S) -> FvResult<()> {
        FvError::check_index("单元", cell, self.n_cells())?;
        self.diag[cell] += value;
        Ok(())
    }

    /// 累加上三角贡献
    pub fn add_to_upper(&mut self, face: usize, value: S) -> FvResult<()> {
        FvError::check_index("面", face, self.n_faces())?;
        self.upper[face] += value;
        Ok(())
    }

    /// 累加下三角贡献（对称矩阵自动物化为非对称）
    pub fn add_to_lower(&mut self, face: usize, value: S) -> FvResult<()> {
        FvError::check_index("面", face, self.n_faces())?;
        self.lower_mut()[face] += value;
        Ok(())
    }

    /// 累加源项贡献
    pub fn add_to_source(&mut self, cell: usize, value: S) -> FvResult<()> {
        FvError::check_index("单元", cell, self.n_cells())?;
        self.source[cell] += value;
        Ok(())
    }

    /// 追加边界块
    pub fn add_boundary_patch(&mut self, patch: BoundaryPatch<S>) -> FvResult<()> {
        for &cell in patch.cells() {
            FvError::check_index("边界单元", cell, self.n_cells())?;
        }
        self.patches.push(patch);
        Ok(())
    }

    /// 追加耦合边界挂钩
    pub fn add_interface(&mut self, interface: Arc<dyn InterfaceUpdate<S>>) {
        self.interfaces.push(interface);
    }

    // =========================================================================
    // 矩阵-向量运算
    // =========================================================================

    #[inline]
    fn check_vector(&self, name: &'static str, v: &[S]) -> FvResult<()> {
        FvError::check_size(name, self.n_cells(), v.len())
    }

    /// 矩阵-向量乘积 out = A·x
    ///
    /// 耦合边界挂钩在本地乘积前后各调用一次。
    pub fn amul(&self, x: &[S], out: &mut [S]) -> FvResult<()> {
        self.check_vector("x", x)?;
        self.check_vector("out", out)?;

        for iface in &self.interfaces {
            iface.initiate(x);
        }

        let owner = self.addr.owner();
        let neighbour = self.addr.neighbour();
        let lower = self.lower();

        for (i, o) in out.iter_mut().enumerate() {
            *o = self.diag[i] * x[i];
        }
        for f in 0..self.n_faces() {
            out[owner[f]] += self.upper[f] * x[neighbour[f]];
            out[neighbour[f]] += lower[f] * x[owner[f]];
        }

        for iface in &self.interfaces {
            iface.update(x, out);
        }
        Ok(())
    }

    /// 并行矩阵-向量乘积（需启用 `parallel` 特性）
    ///
    /// 按行并行，行内贡献通过单元邻接面表收集，无写冲突。
    #[cfg(feature = "parallel")]
    pub fn amul_parallel(&self, x: &[S], out: &mut [S]) -> FvResult<()> {
        self.check_vector("x", x)?;
        self.check_vector("out", out)?;

        for iface in &self.interfaces {
            iface.initiate(x);
        }

        let owner = self.addr.owner();
        let neighbour = self.addr.neighbour();
        let lower = self.lower();
        let addr = &self.addr;

        out.par_iter_mut().enumerate().for_each(|(i, o)| {
            let mut sum = self.diag[i] * x[i];
            for &f in addr.owner_faces(i) {
                sum += self.upper[f] * x[neighbour[f]];
            }
            for &f in addr.neighbour_faces(i) {
                sum += lower[f] * x[owner[f]];
            }
            *o = sum;
        });

        for iface in &self.interfaces {
            iface.update(x, out);
        }
        Ok(())
    }

    /// 转置矩阵-向量乘积 out = Aᵀ·x
    ///
    /// BiCG 影子残差递推使用；上下三角角色互换。
    pub fn tmul(&self, x: &[S], out: &mut [S]) -> FvResult<()> {
        self.check_vector("x", x)?;
        self.check_vector("out", out)?;

        for iface in &self.interfaces {
            iface.initiate(x);
        }

        let owner = self.addr.owner();
        let neighbour = self.addr.neighbour();
        let lower = self.lower();

        for (i, o) in out.iter_mut().enumerate() {
            *o = self.diag[i] * x[i];
        }
        for f in 0..self.n_faces() {
            out[owner[f]] += lower[f] * x[neighbour[f]];
            out[neighbour[f]] += self.upper[f] * x[owner[f]];
        }

        for iface in &self.interfaces {
            iface.update(x, out);
        }
        Ok(())
    }

    /// 残差 out = b - A·x
    pub fn residual(&self, x: &[S], b: &[S], out: &mut [S]) -> FvResult<()> {
        self.check_vector("b", b)?;
        self.amul(x, out)?;
        for (o, &bi) in out.iter_mut().zip(b.iter()) {
            *o = bi - *o;
        }
        Ok(())
    }

    /// 行和 A·1（残差归一化的参考尺度）
    pub fn row_sum(&self) -> Vec<S> {
        let owner = self.addr.owner();
        let neighbour = self.addr.neighbour();
        let lower = self.lower();

        let mut sums = self.diag.clone();
        for f in 0..self.n_faces() {
            sums[owner[f]] += self.upper[f];
            sums[neighbour[f]] += lower[f];
        }
        sums
    }

    // =========================================================================
    // 求解入口检查与边界折叠
    // =========================================================================

    /// 防御性检查全部系数有限
    ///
    /// 求解入口调用一次；任何 NaN/Inf 系数都是装配层缺陷。
    pub fn check_finite(&self) -> FvResult<()> {
        let check = |name: &str, data: &[S]| -> FvResult<()> {
            if let Err((i, v)) = S::validate_slice(data) {
                return Err(FvError::numerical(format!(
                    "{} 第 {} 个系数非有限: {}",
                    name, i, v
                )));
            }
            Ok(())
        };
        check("对角", &self.diag)?;
        check("上三角", &self.upper)?;
        if let Some(lower) = &self.lower {
            check("下三角", lower)?;
        }
        check("源项", &self.source)?;
        for (p, patch) in self.patches.iter().enumerate() {
            check("边界块对角贡献", &patch.internal_coeffs)
                .map_err(|_| FvError::numerical(format!("边界块 {} 对角贡献非有限", p)))?;
            check("边界块源项贡献", &patch.boundary_coeffs)
                .map_err(|_| FvError::numerical(format!("边界块 {} 源项贡献非有限", p)))?;
        }
        Ok(())
    }

    /// 把边界块贡献折叠进对角与源项
    ///
    /// 返回折叠前的对角与源项，供 [`restore_boundary`](Self::restore_boundary)
    /// 恢复。选型入口在求解前后成对调用。
    pub fn fold_boundary(&mut self) -> FoldedBoundary<S> {
        let saved = FoldedBoundary {
            diag: self.diag.clone(),
            source: self.source.clone(),
        };
        for patch in &self.patches {
            for (k, &cell) in patch.cells.iter().enumerate() {
                self.diag[cell] += patch.internal_coeffs[k];
                self.source[cell] += patch.boundary_coeffs[k];
            }
        }
        saved
    }

    /// 恢复 `fold_boundary` 之前的对角与源项
    pub fn restore_boundary(&mut self, saved: FoldedBoundary<S>) {
        self.diag = saved.diag;
        self.source = saved.source;
    }
}

impl<S: SolverScalar> std::fmt::Debug for LduMatrix<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LduMatrix")
            .field("n_cells", &self.n_cells())
            .field("n_faces", &self.n_faces())
            .field("symmetric", &self.is_symmetric())
            .field("n_patches", &self.patches.len())
            .field("n_interfaces", &self.interfaces.len())
            .finish()
    }
}
