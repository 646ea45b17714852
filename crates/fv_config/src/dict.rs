// crates/fv_config/src/dict.rs

//! SolverDict - 线性求解器字典（全 f64）
//!
//! 对应每个待解场的一段配置：求解器类型、预条件器/光顺器类型、
//! 收敛容差与多重网格参数。字段名与序列化键保持 camelCase，
//! 与上层应用的配置文件一致。
//!
//! # 使用示例
//!
//! ```
//! use fv_config::SolverDict;
//!
//! let dict = SolverDict::pcg("DIC", 1e-8);
//! assert_eq!(dict.solver, "PCG");
//! dict.validate().unwrap();
//!
//! let json = dict.to_json_string().unwrap();
//! let back = SolverDict::from_json_str(&json).unwrap();
//! assert_eq!(back.tolerance, 1e-8);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// 残差归一化方式
///
/// 归一化常数的具体取法是收敛速度的启发式，不影响解的正确性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum NormKind {
    /// 场尺度归一化: sum|A·x - ref| + sum|b - ref|，ref 为行和乘以解均值。
    /// 容差由此获得网格无关性。
    #[default]
    Normalised,
    /// 右端项归一化: 残差 L1 范数除以 ||b||₁
    Rhs,
}

/// 求解器字典（全 f64）
///
/// 每个字段都有显式默认值；`maxIter` 缺省 1000，保证不会静默死循环。
/// 多重网格相关字段仅在 `solver = "GAMG"` 时生效。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverDict {
    /// 求解器类型名（PCG/PBiCG/smoothSolver/GAMG）
    pub solver: String,

    /// 预条件器类型名（Krylov 求解器用）
    pub preconditioner: String,

    /// 光顺器类型名（smoothSolver 与 GAMG 用）
    pub smoother: String,

    /// 绝对收敛容差（作用于归一化残差）
    pub tolerance: f64,

    /// 相对收敛容差（当前残差/初始残差）
    pub rel_tol: f64,

    /// 最大迭代次数
    pub max_iter: usize,

    /// smoothSolver 两次残差检查之间的扫描次数
    pub n_sweeps: usize,

    /// 多重网格下行前光顺次数
    pub n_pre_sweeps: usize,

    /// 多重网格上行后光顺次数
    pub n_post_sweeps: usize,

    /// 最细层修正后的额外光顺次数
    pub n_finest_sweeps: usize,

    /// 聚并层合并数（一层存储合并 mergeLevels 次两两配对）
    pub merge_levels: usize,

    /// 最粗层最少方程数（粗化终止条件）
    pub min_coarse_eqns: usize,

    /// 粗化层数上限
    pub max_levels: usize,

    /// 是否跨求解缓存聚并拓扑（拓扑不变时复用）
    pub cache_agglomeration: bool,

    /// 残差归一化方式
    pub norm: NormKind,
}

impl Default for SolverDict {
    fn default() -> Self {
        Self {
            solver: String::new(),
            preconditioner: "none".to_string(),
            smoother: "symGaussSeidel".to_string(),
            tolerance: 1e-6,
            rel_tol: 0.0,
            max_iter: 1000,
            n_sweeps: 1,
            n_pre_sweeps: 0,
            n_post_sweeps: 2,
            n_finest_sweeps: 2,
            merge_levels: 1,
            min_coarse_eqns: 4,
            max_levels: 50,
            cache_agglomeration: false,
            norm: NormKind::Normalised,
        }
    }
}

impl SolverDict {
    /// 创建 PCG 字典（对称系统）
    pub fn pcg(preconditioner: impl Into<String>, tolerance: f64) -> Self {
        Self {
            solver: "PCG".to_string(),
            preconditioner: preconditioner.into(),
            tolerance,
            ..Default::default()
        }
    }

    /// 创建 PBiCG 字典（非对称系统）
    pub fn pbicg(preconditioner: impl Into<String>, tolerance: f64) -> Self {
        Self {
            solver: "PBiCG".to_string(),
            preconditioner: preconditioner.into(),
            tolerance,
            ..Default::default()
        }
    }

    /// 创建 smoothSolver 字典
    pub fn smooth_solver(smoother: impl Into<String>, tolerance: f64) -> Self {
        Self {
            solver: "smoothSolver".to_string(),
            smoother: smoother.into(),
            tolerance,
            ..Default::default()
        }
    }

    /// 创建 GAMG 字典
    pub fn gamg(smoother: impl Into<String>, tolerance: f64) -> Self {
        Self {
            solver: "GAMG".to_string(),
            smoother: smoother.into(),
            tolerance,
            ..Default::default()
        }
    }

    /// 设置相对容差
    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    /// 设置最大迭代次数
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// 设置残差归一化方式
    pub fn with_norm(mut self, norm: NormKind) -> Self {
        self.norm = norm;
        self
    }

    /// 验证配置合法性
    ///
    /// 在构建求解器之前调用，拦截非法值。求解器/预条件器名称
    /// 是否已注册由核心层的注册表检查。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solver.is_empty() {
            return Err(ConfigError::Missing("solver".into()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::invalid_value(
                "tolerance",
                self.tolerance,
                "必须为非负有限值",
            ));
        }
        if !self.rel_tol.is_finite() || self.rel_tol < 0.0 || self.rel_tol >= 1.0 {
            return Err(ConfigError::invalid_value(
                "relTol",
                self.rel_tol,
                "必须在 [0, 1) 内",
            ));
        }
        if self.max_iter == 0 {
            return Err(ConfigError::invalid_value(
                "maxIter",
                self.max_iter,
                "必须至少为 1",
            ));
        }
        if self.n_sweeps == 0 {
            return Err(ConfigError::invalid_value(
                "nSweeps",
                self.n_sweeps,
                "必须至少为 1",
            ));
        }
        if self.merge_levels == 0 {
            return Err(ConfigError::invalid_value(
                "mergeLevels",
                self.merge_levels,
                "必须至少为 1",
            ));
        }
        if self.min_coarse_eqns == 0 {
            return Err(ConfigError::invalid_value(
                "minCoarseEqns",
                self.min_coarse_eqns,
                "必须至少为 1",
            ));
        }
        if self.max_levels == 0 {
            return Err(ConfigError::invalid_value(
                "maxLevels",
                self.max_levels,
                "必须至少为 1",
            ));
        }
        Ok(())
    }

    /// 从 JSON 字符串解析
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// 从 JSON 文件读取
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 序列化为 JSON 字符串
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
