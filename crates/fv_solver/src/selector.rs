// crates/fv_solver/src/selector.rs

//! 按场求解入口
//!
//! 给定场名与该场的求解字典，完成一次线性求解的全部编排：
//! 验证字典 → 防御性检查矩阵 → 折叠边界贡献 → 构建求解器 →
//! 求解 → 恢复矩阵 → 输出日志并返回性能报告。
//!
//! 选型器跨求解不缓存任何与矩阵数值相关的状态；求解器实例
//! 每次新建（构造开销远小于求解开销）。唯一的例外是开启
//! `cacheAgglomeration` 时复用的聚并拓扑，它只依赖寻址，
//! 寻址替换（`Arc` 指针变化）即作废。

use std::sync::Arc;

use fv_config::SolverDict;
use fv_foundation::{FvError, FvResult, SolverScalar};

use crate::coupling::{LocalReduction, Reduction};
use crate::matrix::LduMatrix;
use crate::multigrid::{Agglomeration, AgglomerationControls};
use crate::registry::SolverRegistry;
use crate::solver::{SolveContext, SolverPerformance};

/// 按场求解选型器
pub struct SolverSelector<S: SolverScalar> {
    registry: SolverRegistry<S>,
    comm: Arc<dyn Reduction<S>>,
    cached_agglomeration: Option<Arc<Agglomeration>>,
}

impl<S: SolverScalar> SolverSelector<S> {
    /// 创建选型器
    pub fn new(registry: SolverRegistry<S>, comm: Arc<dyn Reduction<S>>) -> Self {
        Self {
            registry,
            comm,
            cached_agglomeration: None,
        }
    }

    /// 单进程选型器（内置注册表 + 恒等归约）
    pub fn serial() -> Self {
        Self::new(SolverRegistry::with_builtin(), Arc::new(LocalReduction))
    }

    /// 注册表访问
    pub fn registry(&self) -> &SolverRegistry<S> {
        &self.registry
    }

    /// 可变注册表访问（注册自定义实现）
    pub fn registry_mut(&mut self) -> &mut SolverRegistry<S> {
        &mut self.registry
    }

    /// 求解一个场的线性系统
    ///
    /// `x` 为初始猜测，原位更新为解。矩阵在调用期间被临时折叠
    /// 边界贡献，返回前恢复原状。
    ///
    /// # 错误
    ///
    /// 仅装配期/配置缺陷返回错误；不收敛与崩溃通过返回的
    /// [`SolverPerformance`] 标志位上报（并输出警告日志）。
    pub fn solve(
        &mut self,
        field_name: &str,
        dict: &SolverDict,
        matrix: &mut LduMatrix<S>,
        x: &mut [S],
    ) -> FvResult<SolverPerformance<S>> {
        dict.validate()
            .map_err(|e| FvError::config(e.to_string()))?;
        FvError::check_size("x", matrix.n_cells(), x.len())?;
        matrix.check_finite()?;

        let solver = self.registry.create_solver(dict)?;
        let agglomeration = self.agglomeration_for(dict, matrix)?;

        // 折叠边界贡献，求解后恢复
        let saved = matrix.fold_boundary();
        let ctx = SolveContext {
            field_name,
            comm: self.comm.as_ref(),
            agglomeration,
        };
        let result = solver.solve(matrix, x, &ctx);
        matrix.restore_boundary(saved);

        let perf = result?;
        perf.log_summary();
        Ok(perf)
    }

    /// 聚并拓扑缓存管理
    ///
    /// 仅在 GAMG + cacheAgglomeration 时构建/复用；寻址指针
    /// 变化即作废重建。
    fn agglomeration_for(
        &mut self,
        dict: &SolverDict,
        matrix: &LduMatrix<S>,
    ) -> FvResult<Option<Arc<Agglomeration>>> {
        if dict.solver != "GAMG" || !dict.cache_agglomeration {
            return Ok(None);
        }

        let valid = self
            .cached_agglomeration
            .as_ref()
            .is_some_and(|agg| Arc::ptr_eq(agg.fine_addressing(), matrix.addressing()));

        if !valid {
            let controls = AgglomerationControls {
                merge_levels: dict.merge_levels,
                min_coarse_eqns: dict.min_coarse_eqns,
                max_levels: dict.max_levels,
            };
            self.cached_agglomeration =
                Some(Arc::new(Agglomeration::build(matrix, &controls)?));
        }
        Ok(self.cached_agglomeration.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::Addressing;
    use crate::matrix::BoundaryPatch;

    type S = f64;

    /// 一维 Poisson 链，两端 Dirichlet 边界经边界块进入
    fn poisson_with_patches(n: usize) -> LduMatrix<S> {
        let addr = Arc::new(
            Addressing::new(n, (0..n - 1).collect(), (1..n).collect()).unwrap(),
        );
        let mut m = LduMatrix::new(addr);
        for i in 0..n {
            m.add_to_diag(i, 2.0).unwrap();
        }
        for f in 0..n - 1 {
            m.add_to_upper(f, -1.0).unwrap();
        }
        // 两端固定值边界: 对角 +1，源项 +边界值
        let patch =
            BoundaryPatch::from_coeffs(vec![0, n - 1], vec![1.0, 1.0], vec![1.0, 2.0]).unwrap();
        m.add_boundary_patch(patch).unwrap();
        m
    }

    #[test]
    fn test_selector_solves_with_boundary_fold() {
        let mut m = poisson_with_patches(8);
        let diag_before = m.diag().to_vec();
        let source_before = m.source().to_vec();

        let mut selector = SolverSelector::<S>::serial();
        let dict = SolverDict::pcg("DIC", 1e-10);
        let mut x = vec![0.0; 8];
        let perf = selector.solve("p", &dict, &mut m, &mut x).unwrap();

        assert!(perf.converged);
        assert_eq!(perf.field_name, "p");
        // 求解后矩阵恢复原状
        assert_eq!(m.diag(), &diag_before[..]);
        assert_eq!(m.source(), &source_before[..]);

        // 解满足折叠后的系统: (2+边界)x₀ - x₁ = 1 等
        assert!(x.iter().all(|v| v.is_finite()));
        let residual0 = 3.0 * x[0] - x[1] - 1.0;
        assert!(residual0.abs() < 1e-8);
    }

    #[test]
    fn test_selector_unknown_solver() {
        let mut m = poisson_with_patches(4);
        let mut selector = SolverSelector::<S>::serial();
        let mut dict = SolverDict::pcg("none", 1e-8);
        dict.solver = "AMG".to_string();
        let mut x = vec![0.0; 4];
        let err = selector.solve("p", &dict, &mut m, &mut x).unwrap_err();
        assert!(matches!(err, FvError::UnknownType { .. }));
    }

    #[test]
    fn test_selector_invalid_dict() {
        let mut m = poisson_with_patches(4);
        let mut selector = SolverSelector::<S>::serial();
        let dict = SolverDict::pcg("none", 1e-8).with_max_iter(0);
        let mut x = vec![0.0; 4];
        let err = selector.solve("p", &dict, &mut m, &mut x).unwrap_err();
        assert!(matches!(err, FvError::Config { .. }));
    }

    #[test]
    fn test_selector_nan_matrix_is_numerical_error() {
        let mut m = poisson_with_patches(4);
        m.diag_mut()[2] = f64::NAN;
        let mut selector = SolverSelector::<S>::serial();
        let dict = SolverDict::pcg("none", 1e-8);
        let mut x = vec![0.0; 4];
        let err = selector.solve("p", &dict, &mut m, &mut x).unwrap_err();
        assert!(matches!(err, FvError::Numerical { .. }));
    }

    #[test]
    fn test_selector_caches_agglomeration_by_addressing() {
        let mut m = poisson_with_patches(32);
        let mut selector = SolverSelector::<S>::serial();
        let dict = {
            let mut d = SolverDict::gamg("symGaussSeidel", 1e-8);
            d.cache_agglomeration = true;
            d
        };

        let mut x = vec![0.0; 32];
        selector.solve("p", &dict, &mut m, &mut x).unwrap();
        let first = selector.cached_agglomeration.clone().unwrap();

        // 同一寻址复用
        let mut x2 = vec![0.0; 32];
        selector.solve("p", &dict, &mut m, &mut x2).unwrap();
        assert!(Arc::ptr_eq(
            &first,
            selector.cached_agglomeration.as_ref().unwrap()
        ));

        // 新寻址（拓扑变化）作废重建
        let mut m2 = poisson_with_patches(32);
        let mut x3 = vec![0.0; 32];
        selector.solve("p", &dict, &mut m2, &mut x3).unwrap();
        assert!(!Arc::ptr_eq(
            &first,
            selector.cached_agglomeration.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_selector_performance_reports_not_converged() {
        let mut m = poisson_with_patches(16);
        let mut selector = SolverSelector::<S>::serial();
        let dict = SolverDict::smooth_solver("GaussSeidel", 1e-30).with_max_iter(3);
        let mut x = vec![0.0; 16];
        let perf = selector.solve("T", &dict, &mut m, &mut x).unwrap();

        // 不收敛不是错误：报告标志位上报
        assert!(!perf.converged);
        assert_eq!(perf.n_iterations, 3);
    }
}
