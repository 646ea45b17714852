// crates/fv_solver/src/lib.rs

//! fvsolve Solver Core
//!
//! 面向有限体积离散的代数线性系统求解核心。离散层（外部协作者）
//! 组装好 [`LduMatrix`] 后交给本层求解；本层按字典选型构建
//! Krylov 或多重网格求解器，迭代至收敛并返回 [`SolverPerformance`]。
//!
//! # 模块概览
//!
//! - [`addressing`]: 面寻址拓扑（owner/neighbour 图）
//! - [`matrix`]: LDU 稀疏矩阵、边界块与耦合接口挂钩
//! - [`vector_ops`]: BLAS Level 1 风格向量运算
//! - [`coupling`]: 并行协作者接口（全局归约、进程边界更新）
//! - [`preconditioner`]: 预条件器族（none/diagonal/DIC/DILU）
//! - [`smoother`]: Gauss-Seidel 光顺器族
//! - [`solver`]: 收敛控制、性能报告与 PCG/PBiCG/smoothSolver
//! - [`multigrid`]: 两两聚并与 GAMG V 循环求解器
//! - [`registry`]: 名称到构造函数的显式注册表
//! - [`selector`]: 按场求解入口
//!
//! # 设计原则
//!
//! 1. **装配期报错**: 尺寸、配置、非有限系数在求解开始前失败
//! 2. **运行期不抛错**: 不收敛与内积崩溃记录在性能报告标志位中
//! 3. **求解期只读**: 矩阵在求解过程中不被修改（借用检查器保证）
//! 4. **每次求解新建求解器**: 构造开销远小于求解开销，杜绝过期预条件状态
//!
//! # 使用示例
//!
//! ```
//! use std::sync::Arc;
//! use fv_config::SolverDict;
//! use fv_solver::{Addressing, LduMatrix, SolverSelector};
//!
//! // 3 单元一维链: 0-1-2
//! let addr = Arc::new(Addressing::new(3, vec![0, 1], vec![1, 2]).unwrap());
//! let mut matrix = LduMatrix::<f64>::new(addr);
//! for i in 0..3 {
//!     matrix.add_to_diag(i, 4.0).unwrap();
//!     matrix.add_to_source(i, 1.0).unwrap();
//! }
//! for f in 0..2 {
//!     matrix.add_to_upper(f, -1.0).unwrap();
//! }
//!
//! let mut selector = SolverSelector::<f64>::serial();
//! let dict = SolverDict::pcg("DIC", 1e-10);
//! let mut x = vec![0.0; 3];
//! let perf = selector.solve("p", &dict, &mut matrix, &mut x).unwrap();
//! assert!(perf.converged);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod addressing;
pub mod coupling;
pub mod matrix;
pub mod multigrid;
pub mod preconditioner;
pub mod registry;
pub mod selector;
pub mod smoother;
pub mod solver;
pub mod vector_ops;

// 重导出常用类型
pub use addressing::Addressing;
pub use coupling::{InterfaceUpdate, LocalReduction, Reduction};
pub use matrix::{BoundaryPatch, LduMatrix};
pub use multigrid::{Agglomeration, AgglomerationControls, GamgControls, GamgSolver};
pub use preconditioner::{
    DicPreconditioner, DiluPreconditioner, DiagonalPreconditioner, NonePreconditioner,
    Preconditioner,
};
pub use registry::SolverRegistry;
pub use selector::SolverSelector;
pub use smoother::{GaussSeidelSmoother, Smoother, SymGaussSeidelSmoother};
pub use solver::{
    LinearSolver, PbicgSolver, PcgSolver, SmoothSolver, SolveContext, SolverControls,
    SolverPerformance,
};

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::addressing::Addressing;
    pub use crate::coupling::{InterfaceUpdate, LocalReduction, Reduction};
    pub use crate::matrix::{BoundaryPatch, LduMatrix};
    pub use crate::selector::SolverSelector;
    pub use crate::solver::{LinearSolver, SolveContext, SolverPerformance};
    pub use fv_config::{NormKind, SolverDict};
    pub use fv_foundation::{FvError, FvResult, SolverScalar};
}
