// crates/fv_solver/src/registry.rs

//! 名称到构造函数的显式注册表
//!
//! 三个模型族（求解器、预条件器、光顺器）各有一张注册表：
//! 族内扁平（一个 trait、多个叶子实现），按名称运行时选型。
//!
//! # 设计原则
//!
//! 1. **显式对象**: 注册表由应用上下文持有并显式初始化，
//!    没有全局/静态可变注册表，注册顺序确定
//! 2. **可扩展**: 应用可注册自定义实现，同名注册覆盖内置实现
//! 3. **可诊断**: 未知名称报 `UnknownType` 并列出全部合法名称

use fv_config::SolverDict;
use fv_foundation::{FvError, FvResult, SolverScalar};

use crate::matrix::LduMatrix;
use crate::multigrid::{GamgControls, GamgSolver};
use crate::preconditioner::{
    DiagonalPreconditioner, DicPreconditioner, DiluPreconditioner, NonePreconditioner,
    Preconditioner,
};
use crate::smoother::{GaussSeidelSmoother, Smoother, SymGaussSeidelSmoother};
use crate::solver::{LinearSolver, PbicgSolver, PcgSolver, SmoothSolver, SolverControls};

/// 预条件器构造函数：从当前矩阵系数新建
pub type PrecondCtor<S> = fn(&LduMatrix<S>) -> FvResult<Box<dyn Preconditioner<S>>>;

/// 光顺器构造函数
pub type SmootherCtor<S> = fn() -> Box<dyn Smoother<S>>;

/// 求解器构造函数：依据字典与注册表（解析预条件器/光顺器名）构建
pub type SolverCtor<S> = fn(&SolverDict, &SolverRegistry<S>) -> FvResult<Box<dyn LinearSolver<S>>>;

/// 求解器/预条件器/光顺器注册表
///
/// Vec 存储保证确定性的注册与报错列表顺序。
pub struct SolverRegistry<S: SolverScalar> {
    solvers: Vec<(&'static str, SolverCtor<S>)>,
    preconditioners: Vec<(&'static str, PrecondCtor<S>)>,
    smoothers: Vec<(&'static str, SmootherCtor<S>)>,
}

impl<S: SolverScalar> SolverRegistry<S> {
    /// 创建空注册表
    pub fn new() -> Self {
        Self {
            solvers: Vec::new(),
            preconditioners: Vec::new(),
            smoothers: Vec::new(),
        }
    }

    /// 创建含全部内置类型的注册表
    pub fn with_builtin() -> Self {
        let mut reg = Self::new();
        reg.register_solver("PCG", build_pcg);
        reg.register_solver("PBiCG", build_pbicg);
        reg.register_solver("smoothSolver", build_smooth_solver);
        reg.register_solver("GAMG", build_gamg);

        reg.register_preconditioner("none", build_none_precond);
        reg.register_preconditioner("diagonal", build_diagonal_precond);
        reg.register_preconditioner("DIC", build_dic_precond);
        reg.register_preconditioner("DILU", build_dilu_precond);

        reg.register_smoother("GaussSeidel", build_gauss_seidel);
        reg.register_smoother("symGaussSeidel", build_sym_gauss_seidel);
        reg
    }

    /// 注册求解器（同名覆盖）
    pub fn register_solver(&mut self, name: &'static str, ctor: SolverCtor<S>) {
        match self.solvers.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = ctor,
            None => self.solvers.push((name, ctor)),
        }
    }

    /// 注册预条件器（同名覆盖）
    pub fn register_preconditioner(&mut self, name: &'static str, ctor: PrecondCtor<S>) {
        match self.preconditioners.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = ctor,
            None => self.preconditioners.push((name, ctor)),
        }
    }

    /// 注册光顺器（同名覆盖）
    pub fn register_smoother(&mut self, name: &'static str, ctor: SmootherCtor<S>) {
        match self.smoothers.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = ctor,
            None => self.smoothers.push((name, ctor)),
        }
    }

    /// 已注册的求解器名称
    pub fn solver_names(&self) -> Vec<String> {
        self.solvers.iter().map(|(n, _)| n.to_string()).collect()
    }

    /// 已注册的预条件器名称
    pub fn preconditioner_names(&self) -> Vec<String> {
        self.preconditioners
            .iter()
            .map(|(n, _)| n.to_string())
            .collect()
    }

    /// 已注册的光顺器名称
    pub fn smoother_names(&self) -> Vec<String> {
        self.smoothers.iter().map(|(n, _)| n.to_string()).collect()
    }

    /// 按名称查找预条件器构造函数
    pub fn preconditioner_ctor(&self, name: &str) -> FvResult<PrecondCtor<S>> {
        self.preconditioners
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ctor)| *ctor)
            .ok_or_else(|| {
                FvError::unknown_type("preconditioner", name, self.preconditioner_names())
            })
    }

    /// 按名称查找光顺器构造函数
    pub fn smoother_ctor(&self, name: &str) -> FvResult<SmootherCtor<S>> {
        self.smoothers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ctor)| *ctor)
            .ok_or_else(|| FvError::unknown_type("smoother", name, self.smoother_names()))
    }

    /// 依据字典构建求解器
    pub fn create_solver(&self, dict: &SolverDict) -> FvResult<Box<dyn LinearSolver<S>>> {
        let ctor = self
            .solvers
            .iter()
            .find(|(n, _)| *n == dict.solver)
            .map(|(_, ctor)| *ctor)
            .ok_or_else(|| FvError::unknown_type("solver", &dict.solver, self.solver_names()))?;
        ctor(dict, self)
    }
}

impl<S: SolverScalar> Default for SolverRegistry<S> {
    fn default() -> Self {
        Self::with_builtin()
    }
}

// =============================================================================
// 内置构造函数
// =============================================================================

fn build_pcg<S: SolverScalar>(
    dict: &SolverDict,
    reg: &SolverRegistry<S>,
) -> FvResult<Box<dyn LinearSolver<S>>> {
    let controls = SolverControls::from_dict(dict)?;
    let precond = reg.preconditioner_ctor(&dict.preconditioner)?;
    Ok(Box::new(PcgSolver::new(controls, precond)))
}

fn build_pbicg<S: SolverScalar>(
    dict: &SolverDict,
    reg: &SolverRegistry<S>,
) -> FvResult<Box<dyn LinearSolver<S>>> {
    let controls = SolverControls::from_dict(dict)?;
    let precond = reg.preconditioner_ctor(&dict.preconditioner)?;
    Ok(Box::new(PbicgSolver::new(controls, precond)))
}

fn build_smooth_solver<S: SolverScalar>(
    dict: &SolverDict,
    reg: &SolverRegistry<S>,
) -> FvResult<Box<dyn LinearSolver<S>>> {
    let controls = SolverControls::from_dict(dict)?;
    let smoother = reg.smoother_ctor(&dict.smoother)?;
    Ok(Box::new(SmoothSolver::new(controls, smoother, dict.n_sweeps)))
}

fn build_gamg<S: SolverScalar>(
    dict: &SolverDict,
    reg: &SolverRegistry<S>,
) -> FvResult<Box<dyn LinearSolver<S>>> {
    let controls = SolverControls::from_dict(dict)?;
    let smoother = reg.smoother_ctor(&dict.smoother)?;
    Ok(Box::new(GamgSolver::new(
        controls,
        GamgControls::from_dict(dict),
        smoother,
    )))
}

fn build_none_precond<S: SolverScalar>(
    _matrix: &LduMatrix<S>,
) -> FvResult<Box<dyn Preconditioner<S>>> {
    Ok(Box::new(NonePreconditioner::new()))
}

fn build_diagonal_precond<S: SolverScalar>(
    matrix: &LduMatrix<S>,
) -> FvResult<Box<dyn Preconditioner<S>>> {
    Ok(Box::new(DiagonalPreconditioner::new(matrix)?))
}

fn build_dic_precond<S: SolverScalar>(
    matrix: &LduMatrix<S>,
) -> FvResult<Box<dyn Preconditioner<S>>> {
    Ok(Box::new(DicPreconditioner::new(matrix)?))
}

fn build_dilu_precond<S: SolverScalar>(
    matrix: &LduMatrix<S>,
) -> FvResult<Box<dyn Preconditioner<S>>> {
    Ok(Box::new(DiluPreconditioner::new(matrix)?))
}

fn build_gauss_seidel<S: SolverScalar>() -> Box<dyn Smoother<S>> {
    Box::new(GaussSeidelSmoother::new())
}

fn build_sym_gauss_seidel<S: SolverScalar>() -> Box<dyn Smoother<S>> {
    Box::new(SymGaussSeidelSmoother::new())
}
