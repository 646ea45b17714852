// crates/fv_solver/src/multigrid/mod.rs

//! 几何代数多重网格
//!
//! 通过两两聚并把矩阵图逐层粗化，在层级上执行 V 循环：
//! 光顺 → 残差限制 → 递归粗层求解 → 修正延拓 → 再光顺。
//!
//! # 模块概览
//!
//! - [`agglomeration`]: 两两聚并层级（拓扑 + Galerkin 系数限制）
//! - [`gamg`]: GAMG V 循环求解器
//!
//! 层级是拓扑形态的状态：每次求解构建一次；`cacheAgglomeration`
//! 开启且寻址未变时由选型器跨求解复用。

pub mod agglomeration;
pub mod gamg;

pub use agglomeration::{Agglomeration, AgglomerationControls, AgglomerationLevel};
pub use gamg::{GamgControls, GamgSolver};
