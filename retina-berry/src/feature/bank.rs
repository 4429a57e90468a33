//! 像素级滤波器. 用于细小血管补全的响应图.

use crate::data::shift;
use crate::{Idx2d, IntensityImage, Offset2d};
use ndarray::{Array2, Zip};
use std::f32::consts::PI;

/// 像素级滤波器能力.
///
/// 每种滤波器是一个独立的值类型, 构造时预计算权重/偏移.
pub trait PixelFeature: Sync {
    /// `pos` 处的响应. 越大表示越像血管.
    fn apply_at(&self, image: &IntensityImage, pos: Idx2d) -> f32;

    /// 整幅图像的响应.
    fn apply(&self, image: &IntensityImage) -> IntensityImage {
        let mut out = Array2::zeros(image.shape());
        let op = |pos: Idx2d, o: &mut f32| *o = self.apply_at(image, pos);
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                Zip::indexed(&mut out).par_for_each(op);
            } else {
                Zip::indexed(&mut out).for_each(op);
            }
        }
        IntensityImage::new(out)
    }
}

/// 反相的局部高斯加权均值. 血管暗于背景, 因此取负号使血管响应更大.
#[derive(Debug, Clone)]
pub struct GaussianFeature {
    kernel: Vec<(Offset2d, f32)>,
}

impl GaussianFeature {
    /// 标准差为 `sigma`, 窗口半径为 `ceil(3 * sigma)`.
    ///
    /// # 注意
    ///
    /// `sigma` 必须为正, 否则 panic.
    pub fn new(sigma: f32) -> Self {
        assert!(sigma > 0.0, "sigma 必须为正");
        let r = (3.0 * sigma).ceil() as isize;
        let kernel = (-r..=r)
            .flat_map(|dh| (-r..=r).map(move |dw| (dh, dw)))
            .map(|(dh, dw)| {
                let d2 = (dh * dh + dw * dw) as f32;
                ((dh, dw), (-d2 / (2.0 * sigma * sigma)).exp())
            })
            .collect();
        Self { kernel }
    }
}

impl PixelFeature for GaussianFeature {
    fn apply_at(&self, image: &IntensityImage, pos: Idx2d) -> f32 {
        let shape = image.shape();
        let (sum, wsum) = self
            .kernel
            .iter()
            .filter_map(|&(d, k)| shift(pos, d, shape).map(|p| (image[p] * k, k)))
            .fold((0.0f32, 0.0f32), |(s, ws), (v, k)| (s + v, ws + k));
        if wsum > 0.0 {
            -sum / wsum
        } else {
            0.0
        }
    }
}

/// 多方向线检测器: `窗口均值 - 最暗方向上的线均值`.
#[derive(Debug, Clone)]
pub struct LineDetector {
    window: Vec<Offset2d>,
    lines: Vec<Vec<Offset2d>>,
}

impl LineDetector {
    /// 长度为 `length` (奇数, 同时也是窗口边长), 方向数为 `angles`.
    ///
    /// # 注意
    ///
    /// `length` 为 0 或 `angles` 为 0 时 panic.
    pub fn new(length: usize, angles: usize) -> Self {
        assert!(length > 0 && angles > 0, "线长与方向数必须为正");
        let r = (length / 2) as isize;
        let window = (-r..=r)
            .flat_map(|dh| (-r..=r).map(move |dw| (dh, dw)))
            .collect();
        let lines = (0..angles)
            .map(|k| {
                let t = PI * k as f32 / angles as f32;
                let (s, c) = t.sin_cos();
                let mut line: Vec<Offset2d> = (-r..=r)
                    .map(|i| ((s * i as f32).round() as isize, (c * i as f32).round() as isize))
                    .collect();
                line.dedup();
                line
            })
            .collect();
        Self { window, lines }
    }

    fn mean_of(image: &IntensityImage, pos: Idx2d, offsets: &[Offset2d]) -> Option<f32> {
        let shape = image.shape();
        let (n, s) = offsets
            .iter()
            .filter_map(|&d| shift(pos, d, shape))
            .fold((0usize, 0.0f32), |(n, s), p| (n + 1, s + image[p]));
        (n > 0).then(|| s / n as f32)
    }
}

impl PixelFeature for LineDetector {
    fn apply_at(&self, image: &IntensityImage, pos: Idx2d) -> f32 {
        let Some(window) = Self::mean_of(image, pos, &self.window) else {
            return 0.0;
        };
        self.lines
            .iter()
            .filter_map(|l| Self::mean_of(image, pos, l))
            .reduce(f32::min)
            .map_or(0.0, |line| window - line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 9x9, 第 4 列为暗线 (0), 其余为 100.
    fn dark_column() -> IntensityImage {
        IntensityImage::from_shape_fn((9, 9), |(_, w)| if w == 4 { 0.0 } else { 100.0 })
    }

    #[test]
    fn test_line_detector_prefers_vessel() {
        let img = dark_column();
        let det = LineDetector::new(5, 12);
        let on = det.apply_at(&img, (4, 4));
        let off = det.apply_at(&img, (4, 1));
        assert!(on > off);
        // 竖直方向的线均值为 0, 窗口均值为 80.
        assert!((on - 80.0).abs() < 1e-4);
        let resp = det.apply(&img);
        assert_eq!(resp[(4, 4)], on);
    }

    #[test]
    fn test_gaussian_inverts() {
        let img = dark_column();
        let g = GaussianFeature::new(1.0);
        assert!(g.apply_at(&img, (4, 4)) > g.apply_at(&img, (4, 0)));
        let flat = IntensityImage::constant((4, 4), 7.0);
        assert!((g.apply_at(&flat, (0, 0)) + 7.0).abs() < 1e-4);
    }
}
