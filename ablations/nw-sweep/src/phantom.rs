//! 合成数据.

use ndarray::Array3;
use retina_berry::prelude::*;

/// 图像边长.
pub const SIDE: usize = 64;

/// 背景强度.
const BACKGROUND: f32 = 150.0;

/// 血管中心相对背景的强度下降.
const DEPTH: f32 = 90.0;

/// 合成的二维血管图像, 包括真值与一个偏粗的初始分割.
pub struct VesselPhantom {
    pub image: IntensityImage,
    pub truth: LabelImage,
    pub initial: LabelImage,
}

/// 点到线段 `a-b` 的距离.
fn distance_to_segment((h, w): Idx2d, a: (f32, f32), b: (f32, f32)) -> f32 {
    let p = (h as f32, w as f32);
    let ab = (b.0 - a.0, b.1 - a.1);
    let ap = (p.0 - a.0, p.1 - a.1);
    let len2 = ab.0 * ab.0 + ab.1 * ab.1;
    let t = if len2 > 0.0 {
        ((ap.0 * ab.0 + ap.1 * ab.1) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let d = (ap.0 - t * ab.0, ap.1 - t * ab.1);
    (d.0 * d.0 + d.1 * d.1).sqrt()
}

impl VesselPhantom {
    /// 一条水平的粗血管 (半宽 3) 与一条斜向的细血管 (半宽 1.5).
    pub fn new() -> Self {
        let s = SIDE as f32;
        let vessels = [
            ((s / 2.0, 2.0), (s / 2.0, s - 3.0), 3.0f32),
            ((4.0, 4.0), (s / 2.0, s / 2.0), 1.5f32),
        ];
        // (到中心线的最近距离 / 半宽)
        let relative = |pos: Idx2d| {
            vessels
                .iter()
                .map(|&(a, b, half)| distance_to_segment(pos, a, b) / half)
                .fold(f32::INFINITY, f32::min)
        };
        let image = IntensityImage::from_shape_fn((SIDE, SIDE), |pos| {
            let r = relative(pos);
            BACKGROUND - DEPTH * (-0.5 * r * r).exp()
        });
        let label = |limit: f32| {
            LabelImage::from_shape_fn((SIDE, SIDE), |pos| {
                if relative(pos) <= limit {
                    LABEL_FOREGROUND
                } else {
                    LABEL_BACKGROUND
                }
            })
        };
        Self {
            image,
            truth: label(1.0),
            initial: label(1.6),
        }
    }
}

impl Default for VesselPhantom {
    fn default() -> Self {
        Self::new()
    }
}

/// 与真值不一致的像素个数.
pub fn disagreement(a: &LabelImage, b: &LabelImage) -> usize {
    a.diff(b).count()
}

/// 合成体数据: 一根沿 z 的管道与若干孤立的噪声体素.
pub fn noisy_tube(depth: usize) -> Volume<u8> {
    let c = (SIDE / 4) as isize;
    let data = Array3::from_shape_fn((depth, SIDE / 2, SIDE / 2), |(z, h, w)| {
        let (dh, dw) = (h as isize - c, w as isize - c);
        let tube = dh * dh + dw * dw <= 4;
        // 稀疏且确定的噪声.
        let noise = (z * 31 + h * 17 + w * 7) % 97 == 0;
        u8::from(tube || noise)
    });
    Volume::new(data)
}
