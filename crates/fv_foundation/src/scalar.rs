// crates/fv_foundation/src/scalar.rs

//! SolverScalar - 密封的标量类型抽象
//!
//! 提供编译期精度选择的唯一接口，使求解核心在 f32 和 f64 之间零成本切换。
//!
//! # 设计原则
//!
//! 1. **密封 Trait**: 只有 f32 和 f64 可以实现（通过 private::Sealed）
//! 2. **零成本抽象**: `#[inline]` + 编译期单态化
//! 3. **从配置转换**: `from_config(f64)` 用于从配置层（全 f64）转换
//!
//! # 使用规范
//!
//! ```rust
//! use fv_foundation::SolverScalar;
//!
//! // 求解核心层使用泛型
//! fn weighted<S: SolverScalar>(a: S, b: S) -> S {
//!     S::HALF * (a + b)
//! }
//! ```

use std::fmt::{Debug, Display, LowerExp};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use bytemuck::Pod;
use num_traits::{Float, FromPrimitive, NumAssign};

/// 密封模块，禁止外部实现
mod private {
    /// 密封 trait
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// 求解器标量类型（密封，仅 f32/f64 可实现）
///
/// 矩阵、预条件器与迭代求解器全部以此 trait 作为泛型边界，
/// 确保计算核心可在 f32 和 f64 之间零成本切换。
///
/// # 实现类型
///
/// - `f32`: 内存占用减半，适合大规模网格与 GPU 后端预留
/// - `f64`: 高精度模式（默认），适合科学验证
pub trait SolverScalar:
    private::Sealed
    + Pod
    + Float
    + FromPrimitive
    + NumAssign
    + Copy
    + Clone
    + Debug
    + Display
    + LowerExp
    + Send
    + Sync
    + Sum
    + Default
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    /// 零值
    const ZERO: Self;
    /// 一
    const ONE: Self;
    /// 二
    const TWO: Self;
    /// 二分之一
    const HALF: Self;
    /// 机器精度
    const EPSILON: Self;
    /// 最小正值
    const MIN_POSITIVE: Self;
    /// 最大值
    const MAX: Self;
    /// 小量（残差归一化保底，避免除零）
    const SMALL: Self;
    /// 极小量（内积崩溃判据）
    const VSMALL: Self;

    /// 从配置层的 f64 值转换
    #[inline]
    fn from_config(v: f64) -> Option<Self> {
        Self::from_f64(v)
    }

    /// 安全除法
    ///
    /// 当除数绝对值小于 VSMALL 时返回 fallback
    #[inline]
    fn safe_div(self, rhs: Self, fallback: Self) -> Self {
        if rhs.abs() < Self::VSMALL {
            fallback
        } else {
            self / rhs
        }
    }

    /// 检查是否有限（非 NaN、非 Inf）
    #[inline]
    fn is_safe(self) -> bool {
        self.is_finite()
    }

    /// 近似相等判断
    #[inline]
    fn approx_eq(self, other: Self, epsilon: Self) -> bool {
        (self - other).abs() < epsilon
    }

    /// 检查是否接近零
    #[inline]
    fn is_near_zero(self, epsilon: Self) -> bool {
        self.abs() < epsilon
    }

    /// 批量验证切片中所有值是否有限
    ///
    /// 返回首个非有限值的位置与值
    fn validate_slice(data: &[Self]) -> Result<(), (usize, Self)> {
        for (i, &v) in data.iter().enumerate() {
            if !v.is_safe() {
                return Err((i, v));
            }
        }
        Ok(())
    }
}

// =============================================================================
// f32 实现
// =============================================================================

impl SolverScalar for f32 {
    const ZERO: f32 = 0.0;
    const ONE: f32 = 1.0;
    const TWO: f32 = 2.0;
    const HALF: f32 = 0.5;
    const EPSILON: f32 = f32::EPSILON;
    const MIN_POSITIVE: f32 = f32::MIN_POSITIVE;
    const MAX: f32 = f32::MAX;
    const SMALL: f32 = 1.0e-6;
    const VSMALL: f32 = 1.0e-37;
}

// =============================================================================
// f64 实现
// =============================================================================

impl SolverScalar for f64 {
    const ZERO: f64 = 0.0;
    const ONE: f64 = 1.0;
    const TWO: f64 = 2.0;
    const HALF: f64 = 0.5;
    const EPSILON: f64 = f64::EPSILON;
    const MIN_POSITIVE: f64 = f64::MIN_POSITIVE;
    const MAX: f64 = f64::MAX;
    const SMALL: f64 = 1.0e-15;
    const VSMALL: f64 = 1.0e-300;
}
