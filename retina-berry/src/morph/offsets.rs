//! 邻接表与二维结构元.

use crate::Offset2d;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 3x3 邻域内 (按行优先编号 `0..9`, 中心为 4) 的格子邻接关系.
///
/// 用于连通性保护: 判断把中心像素置为背景后, 3x3 子图内前景连通分量个数是否增加.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborOffsetTable {
    adj: [&'static [usize]; 9],
}

/// 8-连通, 但去掉边中点之间的对角连接.
///
/// 角点仍然与中心以及相邻的两个边中点相连; 边中点之间不相连,
/// 因此十字形去掉中心后会分裂成四个分量.
const CORNER_GUARDED: [&[usize]; 9] = [
    &[1, 3, 4],
    &[0, 2, 4],
    &[1, 4, 5],
    &[0, 4, 6],
    &[0, 1, 2, 3, 5, 6, 7, 8],
    &[2, 4, 8],
    &[3, 4, 7],
    &[4, 6, 8],
    &[4, 5, 7],
];

/// 历史实现使用的完整 8-连通表.
const LEGACY: [&[usize]; 9] = [
    &[1, 3, 4],
    &[0, 2, 3, 4, 5],
    &[1, 4, 5],
    &[0, 1, 4, 6, 7],
    &[0, 1, 2, 3, 5, 6, 7, 8],
    &[1, 2, 4, 7, 8],
    &[3, 4, 7],
    &[3, 4, 5, 6, 8],
    &[4, 5, 7],
];

impl NeighborOffsetTable {
    /// 默认邻接表, 见 `CORNER_GUARDED`.
    #[inline]
    pub const fn corner_guarded() -> Self {
        Self {
            adj: CORNER_GUARDED,
        }
    }

    /// 历史实现的 8-连通邻接表.
    #[inline]
    pub const fn legacy() -> Self {
        Self { adj: LEGACY }
    }

    /// 格子 `cell` 的邻居.
    ///
    /// # 注意
    ///
    /// `cell >= 9` 时 panic.
    #[inline]
    pub fn neighbours(&self, cell: usize) -> &'static [usize] {
        self.adj[cell]
    }
}

impl Default for NeighborOffsetTable {
    #[inline]
    fn default() -> Self {
        Self::corner_guarded()
    }
}

/// 连通性保护所使用的邻接表种类.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connectivity {
    /// `NeighborOffsetTable::corner_guarded`.
    #[default]
    CornerGuarded,

    /// `NeighborOffsetTable::legacy`.
    Legacy,
}

impl Connectivity {
    /// 对应的邻接表.
    #[inline]
    pub const fn table(self) -> NeighborOffsetTable {
        match self {
            Connectivity::CornerGuarded => NeighborOffsetTable::corner_guarded(),
            Connectivity::Legacy => NeighborOffsetTable::legacy(),
        }
    }
}

/// 二维结构元, 即一组相对中心的 `(dh, dw)` 偏移.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructElem2d {
    offsets: Vec<Offset2d>,
}

impl StructElem2d {
    /// 边长为 `2 * half + 1` 的正方形.
    pub fn square(half: usize) -> Self {
        let r = half as isize;
        let offsets = (-r..=r).flat_map(|dh| (-r..=r).map(move |dw| (dh, dw))).collect();
        Self { offsets }
    }

    /// 半径为 `radius` 的圆盘: `dh^2 + dw^2 <= radius^2`.
    ///
    /// 半径 0 只包含中心, 半径 1 为十字形.
    pub fn disk(radius: usize) -> Self {
        let r = radius as isize;
        let offsets = (-r..=r)
            .flat_map(|dh| (-r..=r).map(move |dw| (dh, dw)))
            .filter(|&(dh, dw)| dh * dh + dw * dw <= r * r)
            .collect();
        Self { offsets }
    }

    /// 8-邻域, 不含中心.
    pub fn ring8() -> Self {
        Self {
            offsets: crate::data::N8.to_vec(),
        }
    }

    /// 全部偏移.
    #[inline]
    pub fn offsets(&self) -> &[Offset2d] {
        &self.offsets
    }

    /// 偏移个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// 是否为空结构元.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
