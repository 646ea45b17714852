// crates/fv_config/src/lib.rs

//! fvsolve Configuration Layer
//!
//! 配置层，定义线性求解器的运行时字典。全部参数使用 f64 存储，
//! 便于 JSON 序列化；构建求解器时由核心层转换到目标精度。
//!
//! # 模块概览
//!
//! - [`dict`]: `SolverDict` 求解器字典与 `NormKind` 残差归一化选项
//! - [`error`]: 配置层错误类型 `ConfigError`
//!
//! # 设计原则
//!
//! 1. **全 f64**: 配置层不感知计算精度，转换发生在核心层入口
//! 2. **显式默认**: 每个字段都有显式有限默认值（maxIter 缺省 1000，绝不静默死循环）
//! 3. **先验证后使用**: `validate()` 在构建求解器前拦截非法值

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dict;
pub mod error;

pub use dict::{NormKind, SolverDict};
pub use error::ConfigError;
