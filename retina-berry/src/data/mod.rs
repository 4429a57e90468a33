//! 二维图像与三维体数据基础结构.

mod image2d;
mod save;
mod volume;

pub use image2d::{BinaryMask, IntensityImage, LabelImage};
pub use save::{ImgWriteRaw, ImgWriteVis};
pub use volume::{Border3, BorderMode, Volume};

use crate::{Idx2d, Offset2d};

/// `pos + d`, 越界 (包括负数) 时返回 `None`.
#[inline]
pub(crate) fn shift((h, w): Idx2d, (dh, dw): Offset2d, (h_len, w_len): Idx2d) -> Option<Idx2d> {
    let h = h.checked_add_signed(dh)?;
    let w = w.checked_add_signed(dw)?;
    (h < h_len && w < w_len).then_some((h, w))
}

/// 3x3 邻域的偏移, 按行优先排列, 下标 4 为中心.
pub(crate) const N9: [Offset2d; 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// 8-邻域偏移 (不含中心).
pub(crate) const N8: [Offset2d; 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];
