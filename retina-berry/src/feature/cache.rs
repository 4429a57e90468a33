//! 候选像素的描述子缓存.

use super::BoundaryDescriptor;
use crate::data::shift;
use crate::{BinaryMask, Idx2d, IntensityImage, LabelImage};
use ndarray::{Array2, Zip};

/// 宽度平滑窗口半径 (5x5).
const SMOOTH_RADIUS: isize = 2;

/// 一个像素的缓存特征.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PixelFeatures {
    /// 平滑后的宽度. 无效时为 0.
    pub width: f32,

    /// 动态范围. 无效时为 0.
    pub dyn_range: f32,

    /// 斜率比. 无效时为 `None`.
    pub ri: Option<f32>,
}

/// 与图像同尺寸的三组特征. 仅候选掩膜内的像素有意义,
/// 每次候选掩膜变化后都需要重新 `rebuild`.
#[derive(Clone, Debug)]
pub struct FeatureCache {
    width: Array2<f32>,
    dyn_range: Array2<f32>,
    ri: Array2<Option<f32>>,
    raw_width: Array2<Option<f32>>,
}

impl FeatureCache {
    /// 分配与 `shape` 同尺寸的缓存, 全部置为无效.
    pub fn new(shape: Idx2d) -> Self {
        Self {
            width: Array2::zeros(shape),
            dyn_range: Array2::zeros(shape),
            ri: Array2::from_elem(shape, None),
            raw_width: Array2::from_elem(shape, None),
        }
    }

    /// 缓存尺寸.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.width.dim()
    }

    /// 全部置为无效, 不重新分配内存.
    pub fn reset(&mut self) {
        self.width.fill(0.0);
        self.dyn_range.fill(0.0);
        self.ri.fill(None);
        self.raw_width.fill(None);
    }

    /// 对 `mask` 内每个像素调用 `descriptor`, 然后在 5x5 窗口内平滑宽度.
    ///
    /// 平滑只统计窗口内同时满足 "是内/外轮廓" 且 "原始宽度有效" 的像素;
    /// 自身原始宽度无效的像素宽度为 0.
    ///
    /// # 注意
    ///
    /// 各输入形状必须与缓存一致, 否则 panic.
    pub fn rebuild<D: BoundaryDescriptor + ?Sized>(
        &mut self,
        labels: &LabelImage,
        image: &IntensityImage,
        mask: &BinaryMask,
        descriptor: &D,
    ) {
        let shape = self.shape();
        assert_eq!(labels.shape(), shape, "标签图像与缓存形状不一致");
        assert_eq!(image.shape(), shape, "强度图像与缓存形状不一致");
        assert_eq!(mask.shape(), shape, "掩膜与缓存形状不一致");

        let describe = |pos: Idx2d, w: &mut Option<f32>, d: &mut f32, r: &mut Option<f32>| {
            let desc = mask[pos]
                .then(|| descriptor.describe(labels, pos, image))
                .flatten();
            match desc {
                Some(desc) => {
                    *w = Some(desc.width);
                    *d = desc.dyn_range;
                    *r = Some(desc.ri);
                }
                None => {
                    *w = None;
                    *d = 0.0;
                    *r = None;
                }
            }
        };
        let zip = Zip::indexed(&mut self.raw_width)
            .and(&mut self.dyn_range)
            .and(&mut self.ri);
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                zip.par_for_each(describe);
            } else {
                zip.for_each(describe);
            }
        }

        let raw = &self.raw_width;
        let smooth = |pos: Idx2d, out: &mut f32| {
            *out = match (mask[pos], raw[pos]) {
                (true, Some(_)) => smoothed_width(labels, raw, pos),
                _ => 0.0,
            };
        };
        let zip = Zip::indexed(&mut self.width);
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                zip.par_for_each(smooth);
            } else {
                zip.for_each(smooth);
            }
        }
    }

    /// `pos` 处的缓存特征.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> PixelFeatures {
        PixelFeatures {
            width: self.width[pos],
            dyn_range: self.dyn_range[pos],
            ri: self.ri[pos],
        }
    }

    /// 拥有有效斜率比的像素个数.
    pub fn valid_count(&self) -> usize {
        self.ri.iter().filter(|r| r.is_some()).count()
    }
}

/// 5x5 窗口内轮廓像素的原始宽度均值. 没有样本时为 0.
fn smoothed_width(labels: &LabelImage, raw: &Array2<Option<f32>>, pos: Idx2d) -> f32 {
    let shape = labels.shape();
    let (mut n, mut sum) = (0usize, 0.0f32);
    for dh in -SMOOTH_RADIUS..=SMOOTH_RADIUS {
        for dw in -SMOOTH_RADIUS..=SMOOTH_RADIUS {
            let Some(q) = shift(pos, (dh, dw), shape) else {
                continue;
            };
            if let Some(w) = raw[q] {
                if labels.is_contour8(q) {
                    n += 1;
                    sum += w;
                }
            }
        }
    }
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Descriptors;
    use ndarray::array;

    /// 宽度等于列号, 第 0 列无法描述.
    struct ColumnDescriptor;

    impl BoundaryDescriptor for ColumnDescriptor {
        fn describe(&self, _: &LabelImage, (_, w): Idx2d, _: &IntensityImage) -> Option<Descriptors> {
            (w > 0).then_some(Descriptors {
                width: w as f32,
                dyn_range: 20.0,
                ri: 0.5,
            })
        }
    }

    #[test]
    fn test_rebuild_and_smooth() {
        let labels = LabelImage::new(array![
            [0, 0, 255, 0, 0],
            [0, 0, 255, 0, 0],
            [0, 0, 255, 0, 0],
        ]);
        let image = IntensityImage::constant((3, 5), 1.0);
        let mut mask = BinaryMask::zeros((3, 5));
        mask[(1, 1)] = true;
        mask[(1, 2)] = true;
        mask[(1, 0)] = true;

        let mut cache = FeatureCache::new((3, 5));
        cache.rebuild(&labels, &image, &mask, &ColumnDescriptor);

        // (1, 1) 与 (1, 2) 都是轮廓并且有效, 平均宽度 1.5.
        let f = cache.get((1, 1));
        assert_eq!(f.width, 1.5);
        assert_eq!(f.dyn_range, 20.0);
        assert_eq!(f.ri, Some(0.5));
        assert_eq!(cache.get((1, 2)).width, 1.5);

        // 原始宽度无效的像素.
        let f = cache.get((1, 0));
        assert_eq!(f.width, 0.0);
        assert_eq!(f.dyn_range, 0.0);
        assert_eq!(f.ri, None);

        // 掩膜外的像素.
        assert_eq!(cache.get((0, 2)).ri, None);
        assert_eq!(cache.valid_count(), 2);

        cache.reset();
        assert_eq!(cache.valid_count(), 0);
    }
}
