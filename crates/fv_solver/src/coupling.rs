// crates/fv_solver/src/coupling.rs

//! 并行协作者接口
//!
//! 求解核心本身是单线程数值计算；并行性由上层的区域分解提供。
//! 本模块定义核心与并行传输层之间仅有的两个同步缝隙：
//!
//! - [`Reduction`]: 跨分区全局归约（内积、残差范数）
//! - [`InterfaceUpdate`]: 矩阵-向量乘积前后的进程边界贡献注入
//!
//! 传输的实现（阻塞/非阻塞消息、归约拓扑）是外部协作者的事情；
//! 核心只要求调用返回时依赖数据已就绪。单进程运行使用
//! [`LocalReduction`] 恒等归约，无任何开销。

use fv_foundation::SolverScalar;

/// 全局归约原语
///
/// CG/BiCG 的步长内积与残差范数都要求跨全部分区的归约。
/// 实现者对 `local` 执行 all-reduce 并返回全局值。
pub trait Reduction<S: SolverScalar>: Send + Sync {
    /// 全局求和
    fn sum(&self, local: S) -> S;

    /// 全局最小值
    fn min(&self, local: S) -> S;

    /// 全局最大值
    fn max(&self, local: S) -> S;
}

/// 单进程恒等归约
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalReduction;

impl<S: SolverScalar> Reduction<S> for LocalReduction {
    #[inline]
    fn sum(&self, local: S) -> S {
        local
    }

    #[inline]
    fn min(&self, local: S) -> S {
        local
    }

    #[inline]
    fn max(&self, local: S) -> S {
        local
    }
}

/// 进程边界/耦合边界更新挂钩
///
/// 每次矩阵-向量乘积前调用 [`initiate`](Self::initiate)（发起邻分区交换），
/// 本地乘积完成后调用 [`update`](Self::update)（把邻分区贡献累加进结果）。
/// 乘积在 `update` 返回前不算完成。
pub trait InterfaceUpdate<S: SolverScalar>: Send + Sync {
    /// 乘积前：用当前解向量发起边界数据交换
    fn initiate(&self, x: &[S]);

    /// 乘积后：把边界贡献累加进乘积结果
    fn update(&self, x: &[S], ax: &mut [S]);
}
