//! 沿标签梯度方向的射线描述子.

use super::{BoundaryDescriptor, Descriptors};
use crate::data::shift;
use crate::{Idx2d, IntensityImage, LabelImage, Offset2d};
use once_cell::sync::Lazy;
use std::f32::consts::TAU;
use std::sync::Arc;

/// 默认射线长度 (像素).
pub const DEFAULT_RAY_LENGTH: usize = 87;

/// 射线方向的量化个数.
const RAY_ANGLES: usize = 360;

/// 射线采样步长 (像素).
const RAY_STEP: f32 = 0.25;

/// 背景均值至少使用的样本数.
const MIN_BG_SAMPLES: usize = 5;

/// 默认长度的射线表, 所有默认描述子共享.
static DEFAULT_RAYS: Lazy<Arc<RayTable>> = Lazy::new(|| Arc::new(RayTable::new(DEFAULT_RAY_LENGTH)));

/// 量化方向上的离散射线. 每条射线以 `(0, 0)` 开头, 相邻重复点已去除.
#[derive(Debug)]
struct RayTable {
    rays: Vec<Vec<Offset2d>>,
}

impl RayTable {
    fn new(length: usize) -> Self {
        let rays = (0..RAY_ANGLES)
            .map(|k| {
                let t = TAU * k as f32 / RAY_ANGLES as f32;
                let (s, c) = t.sin_cos();
                let mut ray: Vec<Offset2d> = Vec::with_capacity(length + 1);
                for j in 0..length * 4 {
                    let r = j as f32 * RAY_STEP;
                    let p = ((s * r).trunc() as isize, (c * r).trunc() as isize);
                    if ray.last() != Some(&p) {
                        ray.push(p);
                    }
                }
                ray
            })
            .collect();
        Self { rays }
    }

    /// 与 `(dh, dw)` 方向最接近的射线.
    fn nearest(&self, dh: f32, dw: f32) -> &[Offset2d] {
        let t = dh.atan2(dw);
        let k = ((t / TAU * RAY_ANGLES as f32).round() as isize).rem_euclid(RAY_ANGLES as isize);
        &self.rays[k as usize]
    }
}

/// "边界处斜率相等" 描述子.
///
/// 1. 在 `pos` 周围 5x5 窗口内, 对所有内/外轮廓像素累加标签的 Sobel 梯度,
///   得到指向前景的平均方向. 梯度和为零时无法描述.
/// 2. 沿该方向行走射线: 第一个前景点到其后第一个背景点之间的距离为宽度,
///   这一段前景上的最小强度为 `min`.
/// 3. 沿反方向收集至多 `max(width / 2, 5)` 个非外轮廓背景像素, 其均值为 `mean`.
/// 4. `ri = clamp((I(pos) - min) / (mean - min), 0, 1)`, `dyn = max(mean - min, 0)`.
#[derive(Debug, Clone)]
pub struct EqualSlopeDescriptor {
    rays: Arc<RayTable>,
    radius: usize,
}

impl Default for EqualSlopeDescriptor {
    fn default() -> Self {
        Self {
            rays: Arc::clone(&DEFAULT_RAYS),
            radius: 2,
        }
    }
}

impl EqualSlopeDescriptor {
    /// 指定射线长度.
    pub fn with_ray_length(length: usize) -> Self {
        if length == DEFAULT_RAY_LENGTH {
            return Self::default();
        }
        Self {
            rays: Arc::new(RayTable::new(length)),
            radius: 2,
        }
    }

    /// 标签的 Sobel 梯度 `(gy, gx)`, 图像外视为背景.
    fn sobel(labels: &LabelImage, pos: Idx2d) -> (f32, f32) {
        let shape = labels.shape();
        let v = |dh: isize, dw: isize| -> f32 {
            shift(pos, (dh, dw), shape).map_or(0.0, |p| labels.is_fg(p) as u8 as f32)
        };
        let gx = (v(-1, 1) + 2.0 * v(0, 1) + v(1, 1)) - (v(-1, -1) + 2.0 * v(0, -1) + v(1, -1));
        let gy = (v(1, -1) + 2.0 * v(1, 0) + v(1, 1)) - (v(-1, -1) + 2.0 * v(-1, 0) + v(-1, 1));
        (gy, gx)
    }

    /// 窗口内轮廓像素的梯度和.
    fn mean_direction(&self, labels: &LabelImage, pos: Idx2d) -> Option<(f32, f32)> {
        let r = self.radius as isize;
        let shape = labels.shape();
        let (mut sh, mut sw) = (0.0f32, 0.0f32);
        for dh in -r..=r {
            for dw in -r..=r {
                let Some(q) = shift(pos, (dh, dw), shape) else {
                    continue;
                };
                if labels.is_contour8(q) {
                    let (gy, gx) = Self::sobel(labels, q);
                    sh += gy;
                    sw += gx;
                }
            }
        }
        (sh != 0.0 || sw != 0.0).then_some((sh, sw))
    }
}

impl BoundaryDescriptor for EqualSlopeDescriptor {
    fn describe(&self, labels: &LabelImage, pos: Idx2d, image: &IntensityImage) -> Option<Descriptors> {
        let (dh, dw) = self.mean_direction(labels, pos)?;
        let ray = self.rays.nearest(dh, dw);
        let shape = labels.shape();
        let fg_at = |d: Offset2d| shift(pos, d, shape).is_some_and(|p| labels.is_fg(p));

        let a = ray.iter().position(|&d| fg_at(d))?;
        let b = ray[a + 1..]
            .iter()
            .position(|&d| !fg_at(d))
            .map_or(ray.len() - 1, |i| i + a + 1);
        let (pa, pb) = (ray[a], ray[b]);
        let width = (((pa.0 - pb.0).pow(2) + (pa.1 - pb.1).pow(2)) as f32).sqrt();

        let min = ray[a..b.max(a + 1)]
            .iter()
            .filter_map(|&d| shift(pos, d, shape).filter(|&p| labels.is_fg(p)))
            .map(|p| image[p])
            .fold(f32::INFINITY, f32::min);

        let bg_len = ((width / 2.0) as usize).max(MIN_BG_SAMPLES);
        let (n, sum) = ray[1..]
            .iter()
            .filter_map(|&(h, w)| shift(pos, (-h, -w), shape))
            .filter(|&p| !labels.is_fg(p) && !labels.is_outer_contour8(p))
            .take(bg_len)
            .fold((0usize, 0.0f32), |(n, s), p| (n + 1, s + image[p]));
        let mean = if n == 0 { 0.0 } else { sum / n as f32 };

        let ri = if mean == min {
            0.0
        } else {
            ((image[pos] - min) / (mean - min)).clamp(0.0, 1.0)
        };
        Some(Descriptors {
            width,
            dyn_range: (mean - min).max(0.0),
            ri,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::gray::LABEL_FOREGROUND;

    fn f32_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    /// 11x15 图像, 第 5..10 列为前景 (宽 5), 前景强度 50, 背景 150.
    fn stripe() -> (LabelImage, IntensityImage) {
        let labels = LabelImage::from_shape_fn((11, 15), |(_, w)| {
            if (5..10).contains(&w) {
                LABEL_FOREGROUND
            } else {
                0
            }
        });
        let image = IntensityImage::from_shape_fn((11, 15), |(_, w)| {
            if (5..10).contains(&w) {
                50.0
            } else {
                150.0
            }
        });
        (labels, image)
    }

    #[test]
    fn test_ray_table() {
        let t = RayTable::new(10);
        let right = t.nearest(0.0, 1.0);
        assert_eq!(right.first(), Some(&(0, 0)));
        assert_eq!(right.last(), Some(&(0, 9)));
        assert!(right.windows(2).all(|w| w[0] != w[1]));
        let down = t.nearest(3.0, 0.0);
        assert_eq!(down[1], (1, 0));
    }

    #[test]
    fn test_stripe_width_from_both_sides() {
        let (labels, image) = stripe();
        let d = EqualSlopeDescriptor::default();

        let inner = d.describe(&labels, (5, 5), &image).unwrap();
        assert!(f32_eq(inner.width, 5.0));
        assert!(f32_eq(inner.dyn_range, 100.0));
        assert!(f32_eq(inner.ri, 0.0));

        let outer = d.describe(&labels, (5, 4), &image).unwrap();
        assert!(f32_eq(outer.width, 5.0));
        assert!(f32_eq(outer.ri, 1.0));

        // 右侧边缘, 梯度指向左.
        let right = d.describe(&labels, (5, 9), &image).unwrap();
        assert!(f32_eq(right.width, 5.0));
    }

    #[test]
    fn test_flat_region_is_undescribed() {
        let (labels, image) = stripe();
        let d = EqualSlopeDescriptor::with_ray_length(20);
        // 远离轮廓的背景像素窗口内没有轮廓.
        assert!(d.describe(&labels, (5, 0), &image).is_none());
        let empty = LabelImage::background((5, 5));
        assert!(d.describe(&empty, (2, 2), &IntensityImage::constant((5, 5), 1.0)).is_none());
    }
}
