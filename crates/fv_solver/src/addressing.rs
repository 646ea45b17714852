// crates/fv_solver/src/addressing.rs

//! 面寻址拓扑
//!
//! 有限体积网格的单元连接图：N 个未知量（单元）由 M 条"面"（边）连接，
//! 每条面记录 owner 与 neighbour 单元索引。矩阵与全部求解器共享同一份
//! 寻址；拓扑变化时整体重建，绝不原位修改。
//!
//! # 不变量
//!
//! 1. `owner[f] < neighbour[f]`（上三角约定）
//! 2. 面按地址序存储：owner 非降序，owner 相同时 neighbour 严格升序。
//!    不完全分解扫描与 Gauss-Seidel 依赖此序。
//!
//! 违反不变量在构造时报错，属于装配层缺陷。

use fv_foundation::{ensure, FvError, FvResult};

/// 面寻址拓扑（不可变）
///
/// 构造后只读；通过 `Arc` 在矩阵与多重网格层级间共享。
#[derive(Debug, Clone)]
pub struct Addressing {
    /// 单元数
    n_cells: usize,
    /// 每条面的 owner 单元（较小索引）
    owner: Vec<usize>,
    /// 每条面的 neighbour 单元（较大索引）
    neighbour: Vec<usize>,
    /// 每个单元作为 owner 的面列表（升序）
    owner_faces: Vec<Vec<usize>>,
    /// 每个单元作为 neighbour 的面列表（升序）
    neighbour_faces: Vec<Vec<usize>>,
}

impl Addressing {
    /// 构造并验证寻址
    ///
    /// # 错误
    ///
    /// - `SizeMismatch`: owner 与 neighbour 长度不一致
    /// - `IndexOutOfBounds`: 单元索引超出 `0..n_cells`
    /// - `Config`: 违反上三角约定或地址序
    pub fn new(n_cells: usize, owner: Vec<usize>, neighbour: Vec<usize>) -> FvResult<Self> {
        ensure!(n_cells > 0, FvError::config("单元数必须大于 0"));
        FvError::check_size("neighbour", owner.len(), neighbour.len())?;

        for f in 0..owner.len() {
            FvError::check_index("owner 单元", owner[f], n_cells)?;
            FvError::check_index("neighbour 单元", neighbour[f], n_cells)?;
            ensure!(
                owner[f] < neighbour[f],
                FvError::config(format!(
                    "面 {} 违反上三角约定: owner={} >= neighbour={}",
                    f, owner[f], neighbour[f]
                ))
            );
            if f > 0 {
                let ordered = owner[f - 1] < owner[f]
                    || (owner[f - 1] == owner[f] && neighbour[f - 1] < neighbour[f]);
                ensure!(
                    ordered,
                    FvError::config(format!(
                        "面 {} 违反地址序: ({}, {}) 在 ({}, {}) 之后",
                        f,
                        owner[f],
                        neighbour[f],
                        owner[f - 1],
                        neighbour[f - 1]
                    ))
                );
            }
        }

        // 派生每个单元的邻接面表，供松弛扫描按行遍历
        let mut owner_faces = vec![Vec::new(); n_cells];
        let mut neighbour_faces = vec![Vec::new(); n_cells];
        for f in 0..owner.len() {
            owner_faces[owner[f]].push(f);
            neighbour_faces[neighbour[f]].push(f);
        }

        Ok(Self {
            n_cells,
            owner,
            neighbour,
            owner_faces,
            neighbour_faces,
        })
    }

    /// 单元数
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// 面数
    #[inline]
    pub fn n_faces(&self) -> usize {
        self.owner.len()
    }

    /// owner 索引切片
    #[inline]
    pub fn owner(&self) -> &[usize] {
        &self.owner
    }

    /// neighbour 索引切片
    #[inline]
    pub fn neighbour(&self) -> &[usize] {
        &self.neighbour
    }

    /// 单元作为 owner 的面列表
    #[inline]
    pub fn owner_faces(&self, cell: usize) -> &[usize] {
        &self.owner_faces[cell]
    }

    /// 单元作为 neighbour 的面列表
    #[inline]
    pub fn neighbour_faces(&self, cell: usize) -> &[usize] {
        &self.neighbour_faces[cell]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_chain() {
        // 一维链 0-1-2-3
        let addr = Addressing::new(4, vec![0, 1, 2], vec![1, 2, 3]).unwrap();
        assert_eq!(addr.n_cells(), 4);
        assert_eq!(addr.n_faces(), 3);
        assert_eq!(addr.owner_faces(1), &[1]);
        assert_eq!(addr.neighbour_faces(1), &[0]);
        assert_eq!(addr.owner_faces(3), &[] as &[usize]);
    }

    #[test]
    fn test_no_faces_is_valid() {
        // 完全不连通图在拓扑层是合法的（粗化层拒绝它）
        let addr = Addressing::new(2, vec![], vec![]).unwrap();
        assert_eq!(addr.n_faces(), 0);
    }

    #[test]
    fn test_zero_cells_rejected() {
        assert!(Addressing::new(0, vec![], vec![]).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let err = Addressing::new(3, vec![0, 1], vec![1]).unwrap_err();
        assert!(matches!(err, FvError::SizeMismatch { .. }));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let err = Addressing::new(3, vec![0, 1], vec![1, 5]).unwrap_err();
        assert!(matches!(err, FvError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_upper_triangular_violation() {
        // owner >= neighbour 被拒绝
        let err = Addressing::new(3, vec![1], vec![0]).unwrap_err();
        assert!(matches!(err, FvError::Config { .. }));
    }

    #[test]
    fn test_address_order_violation() {
        // 面未按 owner 排序
        let err = Addressing::new(4, vec![1, 0], vec![2, 1]).unwrap_err();
        assert!(matches!(err, FvError::Config { .. }));

        // 同 owner 下 neighbour 必须升序（重复面也被拒绝）
        let err = Addressing::new(4, vec![0, 0], vec![2, 2]).unwrap_err();
        assert!(matches!(err, FvError::Config { .. }));
    }

    #[test]
    fn test_quad_mesh_adjacency() {
        // 2x2 网格:
        //   2 3
        //   0 1
        let addr = Addressing::new(4, vec![0, 0, 1, 2], vec![1, 2, 3, 3]).unwrap();
        assert_eq!(addr.owner_faces(0), &[0, 1]);
        assert_eq!(addr.neighbour_faces(3), &[2, 3]);
    }
}
