//! 边界几何描述子, 特征缓存与像素级滤波器.

mod bank;
mod cache;
mod slope;

pub use bank::{GaussianFeature, LineDetector, PixelFeature};
pub use cache::{FeatureCache, PixelFeatures};
pub use slope::EqualSlopeDescriptor;

use crate::{Idx2d, IntensityImage, LabelImage};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一个边界像素的局部几何描述.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Descriptors {
    /// 局部血管宽度 (像素).
    pub width: f32,

    /// 局部动态范围, 即背景均值与血管内最小值之差.
    pub dyn_range: f32,

    /// 斜率比, 位于 `[0, 1]`.
    pub ri: f32,
}

/// 边界描述子能力.
///
/// 优化器只依赖这一接口, 具体实现 (射线行走, 滤波器组等) 可以替换.
/// 实现必须是 `Sync` 的, 因为特征缓存会并行地调用它.
pub trait BoundaryDescriptor: Sync {
    /// 计算 `pos` 处的描述子. 无法确定时返回 `None`.
    fn describe(&self, labels: &LabelImage, pos: Idx2d, image: &IntensityImage) -> Option<Descriptors>;
}
