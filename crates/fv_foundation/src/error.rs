// crates/fv_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `FvError` 枚举和 `FvResult` 类型别名，用于整个工作区的错误处理。
//!
//! # 设计原则
//!
//! 1. **装配期致命**: 尺寸不匹配、未知类型名、非有限系数在构造/求解入口报错
//! 2. **运行期不抛错**: 不收敛与 Krylov 崩溃不是错误，记录在性能报告中
//! 3. **可诊断**: 未知类型错误附带全部合法名称列表
//!
//! # 示例
//!
//! ```
//! use fv_foundation::error::{FvError, FvResult};
//!
//! fn lookup(name: &str) -> FvResult<()> {
//!     Err(FvError::unknown_type("preconditioner", name, vec!["none".into(), "diagonal".into()]))
//! }
//! ```

use thiserror::Error;

/// 统一结果类型
pub type FvResult<T> = Result<T, FvError>;

/// fvsolve 错误类型
///
/// 核心错误类型，全部为装配期/构造期致命错误。
/// 求解过程中的不收敛与崩溃通过 `SolverPerformance` 标志位上报，不走此类型。
#[derive(Error, Debug)]
pub enum FvError {
    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 缺少配置项
    #[error("缺少必需的配置项: {key}")]
    MissingConfig {
        /// 配置键名
        key: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 未知类型名（字典选型失败）
    #[error("未知的{kind}类型: '{name}', 合法类型: {valid:?}")]
    UnknownType {
        /// 类型族名称（solver/preconditioner/smoother）
        kind: &'static str,
        /// 请求的名称
        name: String,
        /// 全部合法名称
        valid: Vec<String>,
    },

    /// 数值错误（非有限系数）
    #[error("数值错误: {message}")]
    Numerical {
        /// 具体错误信息
        message: String,
    },

    /// 奇异矩阵（对角元为零）
    #[error("奇异矩阵: 第 {row} 行对角元为零")]
    SingularMatrix {
        /// 出问题的行号
        row: usize,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl FvError {
    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 缺少配置
    pub fn missing_config(key: impl Into<String>) -> Self {
        Self::MissingConfig { key: key.into() }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 未知类型名
    pub fn unknown_type(kind: &'static str, name: impl Into<String>, valid: Vec<String>) -> Self {
        Self::UnknownType {
            kind,
            name: name.into(),
            valid,
        }
    }

    /// 数值错误
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical {
            message: message.into(),
        }
    }

    /// 奇异矩阵
    pub fn singular(row: usize) -> Self {
        Self::SingularMatrix { row }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl FvError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> FvResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查索引是否在范围内
    #[inline]
    pub fn check_index(index_type: &'static str, index: usize, len: usize) -> FvResult<()> {
        if index >= len {
            Err(Self::index_out_of_bounds(index_type, index, len))
        } else {
            Ok(())
        }
    }
}

// ========================================================================
// 条件检查宏
// ========================================================================

/// 条件不满足时返回给定错误
///
/// ```
/// use fv_foundation::{ensure, FvError, FvResult};
///
/// fn positive(v: i32) -> FvResult<()> {
///     ensure!(v > 0, FvError::config("必须为正"));
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}

/// 解包 Option，为空时返回给定错误
///
/// ```
/// use fv_foundation::{require, FvError, FvResult};
///
/// fn first(v: &[f64]) -> FvResult<f64> {
///     let x = require!(v.first(), FvError::config("空向量"));
///     Ok(*x)
/// }
/// ```
#[macro_export]
macro_rules! require {
    ($opt:expr, $err:expr) => {
        match $opt {
            Some(v) => v,
            None => return Err($err),
        }
    };
}

// ========================================================================
// 测试
// ========================================================================
