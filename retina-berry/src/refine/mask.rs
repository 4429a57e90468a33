//! 候选像素 (SlopeMask) 的构造.

use crate::morph::{dilate, erode, skeleton_exclusion, StructElem2d};
use crate::{BinaryMask, LabelImage};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 外层迭代所处的阶段.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    /// 腐蚀阶段: 候选像素是前景边界, 只考虑 "前景 -> 背景".
    Inner,

    /// 膨胀阶段: 候选像素是背景边界.
    Outer,
}

impl Phase {
    /// 第 `iteration` 次外层迭代的阶段.
    #[inline]
    pub fn of_iteration(iteration: u32, inner_iterations: u32) -> Self {
        if iteration < inner_iterations {
            Phase::Inner
        } else {
            Phase::Outer
        }
    }
}

/// 候选掩膜构造器. 骨架保护区在构造时由初始标签计算一次.
#[derive(Debug, Clone)]
pub struct BoundaryMaskBuilder {
    se: StructElem2d,
    exclusion: BinaryMask,
}

impl BoundaryMaskBuilder {
    /// 由初始标签构造.
    pub fn new(seed: &LabelImage) -> Self {
        Self {
            se: StructElem2d::disk(1),
            exclusion: skeleton_exclusion(seed),
        }
    }

    /// 骨架端点保护区.
    #[inline]
    pub fn exclusion(&self) -> &BinaryMask {
        &self.exclusion
    }

    /// 当前阶段的候选掩膜.
    ///
    /// - `Phase::Inner`: `erode(labels) != labels` 且不在保护区内;
    /// - `Phase::Outer`: `dilate(labels) != labels`.
    pub fn build(&self, labels: &LabelImage, phase: Phase) -> BinaryMask {
        match phase {
            Phase::Inner => labels
                .diff(&erode(labels, &self.se, None))
                .and_not(&self.exclusion),
            Phase::Outer => labels.diff(&dilate(labels, &self.se, None)),
        }
    }

    /// 误差摘要使用的两组掩膜: 3x3 腐蚀边界 (去掉保护区) 与 5x5 膨胀边界.
    pub fn error_masks(&self, labels: &LabelImage) -> (BinaryMask, BinaryMask) {
        let inner = labels
            .diff(&erode(labels, &StructElem2d::square(1), None))
            .and_not(&self.exclusion);
        let outer = labels.diff(&dilate(labels, &StructElem2d::square(2), None));
        (inner, outer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::gray::LABEL_FOREGROUND;

    fn square_blob() -> LabelImage {
        LabelImage::from_shape_fn((9, 9), |(h, w)| {
            if (2..7).contains(&h) && (2..7).contains(&w) {
                LABEL_FOREGROUND
            } else {
                0
            }
        })
    }

    #[test]
    fn test_phase() {
        assert_eq!(Phase::of_iteration(0, 1), Phase::Inner);
        assert_eq!(Phase::of_iteration(1, 1), Phase::Outer);
        assert_eq!(Phase::of_iteration(0, 0), Phase::Outer);
    }

    #[test]
    fn test_masks() {
        let labels = square_blob();
        let b = BoundaryMaskBuilder::new(&labels);
        let inner = b.build(&labels, Phase::Inner);
        // 内侧候选都是前景, 且不在保护区内.
        assert!(inner.positions().all(|p| labels.is_fg(p) && !b.exclusion().contains(p)));
        assert!(inner.count() > 0);
        let outer = b.build(&labels, Phase::Outer);
        // 十字形膨胀: 四条边各 5 个像素.
        assert_eq!(outer.count(), 20);
        assert!(outer.positions().all(|p| !labels.is_fg(p)));

        let (ei, eo) = b.error_masks(&labels);
        assert!(ei.count() <= 16);
        // 5x5 膨胀一圈宽 2: 9x9 - 5x5.
        assert_eq!(eo.count(), 81 - 25);
    }
}
