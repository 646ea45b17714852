// crates/fv_foundation/src/lib.rs

//! fvsolve Foundation Layer
//!
//! 基础层，提供求解器各层共享的基础抽象。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型 `FvError` 与 `FvResult`
//! - [`scalar`]: SolverScalar trait（密封，仅 f32/f64 可实现）
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 thiserror、num-traits 与 bytemuck
//! 2. **装配期报错**: 尺寸不匹配、非法配置在求解开始前即失败
//! 3. **零成本抽象**: 标量泛型编译期单态化，运行时无开销
//!
//! # 示例
//!
//! ```
//! use fv_foundation::{FvError, FvResult, SolverScalar};
//!
//! fn check(n: usize, actual: usize) -> FvResult<()> {
//!     FvError::check_size("diag", n, actual)
//! }
//!
//! let eps = f64::from_config(1e-10).unwrap();
//! assert!(eps > f64::ZERO);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod scalar;

// 重导出常用类型
pub use error::{FvError, FvResult};
pub use scalar::SolverScalar;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{FvError, FvResult};
    pub use crate::scalar::SolverScalar;
    pub use crate::{ensure, require};
}
