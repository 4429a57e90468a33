//! 细小血管补全: 在滤波器组响应图上做多门限区域提取, 把细长且响应足够强的区域加入前景.

use crate::consts::gray::LABEL_FOREGROUND;
use crate::error::{ConfigError, ConfigResult};
use crate::feature::PixelFeature;
use crate::morph::{farthest_distance, regions8};
use crate::{Area2d, BinaryMask, Idx2d, IntensityImage, LabelImage};
use log::{debug, info};
use ndarray::{Array2, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 门限扫描的上界 (含).
const THRESHOLD_END: f32 = 1.0;

/// 细小血管补全的参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ThinObjectParams {
    /// 区域内 (尚未是前景的像素的) 平均响应下限.
    pub a_parameter: f32,

    /// 单个滤波器的归一化响应超过该值才计入均值.
    pub f_parameter: f32,

    /// 区域像素数下限, 同时也是最远像素距离的下限.
    pub size_min: usize,

    /// 区域像素数上限.
    pub size_max: usize,

    /// 门限扫描起点.
    pub th_start: f32,

    /// 门限扫描步长.
    pub th_step: f32,

    /// 超过该像素数的区域直接跳过.
    pub max_region: usize,
}

impl Default for ThinObjectParams {
    fn default() -> Self {
        Self {
            a_parameter: 0.6,
            f_parameter: 0.0,
            size_min: 20,
            size_max: 200,
            th_start: 0.45,
            th_step: 0.01,
            max_region: 150000,
        }
    }
}

impl ThinObjectParams {
    /// 检查参数合法性.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.th_step.is_finite() && self.th_step > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "th_step",
                reason: "must be finite and positive",
            });
        }
        if !self.th_start.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "th_start",
                reason: "must be finite",
            });
        }
        if self.size_min > self.size_max {
            return Err(ConfigError::InvalidParameter {
                name: "size_min",
                reason: "must not exceed size_max",
            });
        }
        Ok(())
    }
}

/// 多个滤波器的平均响应.
///
/// 每个滤波器的响应先线性归一化到 `[0, 1]`; 像素值是归一化响应大于
/// `f_parameter` 的那些滤波器的均值, 没有这样的滤波器时为 0. `roi` 外为 0.
pub fn mean_filter_response(
    image: &IntensityImage,
    bank: &[&dyn PixelFeature],
    roi: Option<&BinaryMask>,
    f_parameter: f32,
) -> IntensityImage {
    let shape = image.shape();
    let mut sum = Array2::<f32>::zeros(shape);
    let mut nums = Array2::<u32>::zeros(shape);
    for filter in bank {
        let response = filter.apply(image).normalized();
        Zip::indexed(&mut sum)
            .and(&mut nums)
            .for_each(|pos, s, n| {
                let v = response[pos];
                if roi.map_or(true, |r| r.contains(pos)) && v > f_parameter {
                    *s += v;
                    *n += 1;
                }
            });
    }
    Zip::from(&mut sum).and(&nums).for_each(|s, &n| {
        if n > 0 {
            *s /= n as f32;
        }
    });
    IntensityImage::new(sum)
}

/// 细小血管补全算子.
///
/// 门限从 `th_start` 以 `th_step` 递增到 1 (含). 每个门限下:
///
/// 1. 提取 `responses > t` (且在 `roi` 内) 的 8-连通区域;
/// 2. 跳过像素数 `<= 1`, `> max_region` 或不在 `[size_min, size_max]` 内的区域;
/// 3. 最远像素距离 `dofp > size_min` 且尚未是前景的像素的平均响应 `> a_parameter`
///   时, 整个区域置为前景. 没有 "尚未是前景" 的像素时跳过.
#[derive(Clone, Debug)]
pub struct ThinObjectAddition {
    params: ThinObjectParams,
}

impl ThinObjectAddition {
    /// 构造. 参数非法时返回 `Err`.
    pub fn new(params: ThinObjectParams) -> ConfigResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// 就地修改 `labels`.
    ///
    /// # 返回值
    ///
    /// 被加入的区域个数. 同一像素集合在不同门限下可以被重复计数.
    pub fn run(
        &self,
        responses: &IntensityImage,
        labels: &mut LabelImage,
        roi: Option<&BinaryMask>,
    ) -> ConfigResult<usize> {
        let shape = labels.shape();
        check_shape(shape, responses.shape())?;
        if let Some(r) = roi {
            check_shape(shape, r.shape())?;
        }
        let p = &self.params;
        let mut added = 0;
        for t in thresholds(p.th_start, p.th_step) {
            let regions = regions8(shape, |pos| {
                responses[pos] > t && roi.map_or(true, |r| r.contains(pos))
            });
            let snapshot = &*labels;
            let accept = |area: &&Area2d| self.accepts(area, responses, snapshot);
            let chosen: Vec<&Area2d>;
            cfg_if::cfg_if! {
                if #[cfg(feature = "rayon")] {
                    chosen = regions.par_iter().filter(accept).collect();
                } else {
                    chosen = regions.iter().filter(accept).collect();
                }
            }
            if !chosen.is_empty() {
                debug!("threshold {t:.2}: {} of {} regions added", chosen.len(), regions.len());
            }
            added += chosen.len();
            for area in chosen {
                set_foreground(labels, area);
            }
        }
        info!("thin object addition: {added} regions added");
        Ok(added)
    }

    fn accepts(&self, area: &[Idx2d], responses: &IntensityImage, labels: &LabelImage) -> bool {
        let p = &self.params;
        let size = area.len();
        if size <= 1 || size > p.max_region || size < p.size_min || size > p.size_max {
            return false;
        }
        let (n, sum) = area
            .iter()
            .filter(|&&pos| !labels.is_fg(pos))
            .fold((0usize, 0.0f32), |(n, s), &pos| (n + 1, s + responses[pos]));
        if n == 0 {
            return false;
        }
        farthest_distance(area) > p.size_min as f32 && sum / n as f32 > p.a_parameter
    }
}

/// 简化版本: 门限从 `th0` 以 0.01 递增 (不含 1), 加入所有 `dofp > length` 的区域.
///
/// # 返回值
///
/// 被加入的区域个数.
///
/// # 注意
///
/// `responses` 与 `labels` 形状必须一致, 否则 panic.
pub fn add_thin_vessels(responses: &IntensityImage, labels: &mut LabelImage, length: f32, th0: f32) -> usize {
    assert_eq!(responses.shape(), labels.shape(), "响应图与标签形状不一致");
    let mut added = 0;
    for t in thresholds(th0, 0.01).filter(|&t| t < THRESHOLD_END) {
        for area in regions8(labels.shape(), |pos| responses[pos] > t) {
            if farthest_distance(&area) > length {
                set_foreground(labels, &area);
                added += 1;
            }
        }
    }
    added
}

/// `start, start + step, ..` 直到 `THRESHOLD_END` (含). 以下标计算, 不累积误差.
fn thresholds(start: f32, step: f32) -> impl Iterator<Item = f32> {
    let count = if start > THRESHOLD_END {
        0
    } else {
        ((THRESHOLD_END - start) / step + 1e-4).floor() as usize + 1
    };
    (0..count).map(move |k| start + k as f32 * step)
}

#[inline]
fn set_foreground(labels: &mut LabelImage, area: &[Idx2d]) {
    for &pos in area {
        labels[pos] = LABEL_FOREGROUND;
    }
}

#[inline]
fn check_shape(expected: Idx2d, found: Idx2d) -> ConfigResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ConfigError::ShapeMismatch { expected, found })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 40x40: 第 5 行 5..35 列为一条长 30 的细线 (响应 0.9);
    /// 左下角 5x5 方块响应 0.9; 右下角长 30 的线响应只有 0.5.
    fn responses() -> IntensityImage {
        IntensityImage::from_shape_fn((40, 40), |(h, w)| match (h, w) {
            (5, 5..=34) => 0.9,
            (30..=34, 2..=6) => 0.9,
            (37, 5..=34) => 0.5,
            _ => 0.0,
        })
    }

    #[test]
    fn test_thresholds() {
        let ts: Vec<f32> = thresholds(0.45, 0.01).collect();
        assert_eq!(ts.len(), 56);
        assert!((ts[55] - 1.0).abs() < 1e-5);
        assert_eq!(thresholds(1.5, 0.01).count(), 0);
    }

    #[test]
    fn test_only_long_bright_regions_added() {
        let resp = responses();
        let mut labels = LabelImage::background((40, 40));
        let op = ThinObjectAddition::new(ThinObjectParams::default()).unwrap();
        let added = op.run(&resp, &mut labels, None).unwrap();
        // 后续门限下区域已全部是前景, 不再计数.
        assert_eq!(added, 1);
        assert_eq!(labels.count_foreground(), 30);
        assert!(labels.is_fg((5, 5)) && labels.is_fg((5, 34)));
        assert!(!labels.is_fg((32, 4)));
        assert!(!labels.is_fg((37, 10)));
    }

    #[test]
    fn test_roi_and_shape() {
        let resp = responses();
        let mut labels = LabelImage::background((40, 40));
        let op = ThinObjectAddition::new(ThinObjectParams::default()).unwrap();
        let roi = BinaryMask::zeros((40, 40));
        assert_eq!(op.run(&resp, &mut labels, Some(&roi)).unwrap(), 0);
        assert!(labels.is_background());

        let bad = BinaryMask::zeros((4, 4));
        assert!(op.run(&resp, &mut labels, Some(&bad)).is_err());
        let p = ThinObjectParams {
            th_step: 0.0,
            ..Default::default()
        };
        assert!(ThinObjectAddition::new(p).is_err());
    }

    #[test]
    fn test_add_thin_vessels() {
        let resp = responses();
        let mut labels = LabelImage::background((40, 40));
        // 门限 0.45..0.89 下细线都满足条件, 每次都计数.
        let added = add_thin_vessels(&resp, &mut labels, 10.0, 0.45);
        assert!(added >= 45);
        assert!(labels.is_fg((5, 20)));
        assert!(!labels.is_fg((32, 4)));
        // 简化版本不检查平均响应.
        assert!(labels.is_fg((37, 20)));
        assert_eq!(labels.count_foreground(), 60);
    }

    /// 响应等于列号.
    struct Columns;

    impl PixelFeature for Columns {
        fn apply_at(&self, _: &IntensityImage, (_, w): Idx2d) -> f32 {
            w as f32
        }
    }

    /// 常数响应, 归一化后全为 0.
    struct Flat;

    impl PixelFeature for Flat {
        fn apply_at(&self, _: &IntensityImage, _: Idx2d) -> f32 {
            3.0
        }
    }

    #[test]
    fn test_mean_filter_response() {
        let image = IntensityImage::constant((2, 5), 0.0);
        let bank: [&dyn PixelFeature; 2] = [&Columns, &Flat];
        let r = mean_filter_response(&image, &bank, None, 0.0);
        assert_eq!(r[(0, 0)], 0.0);
        assert_eq!(r[(1, 4)], 1.0);
        assert!((r[(0, 2)] - 0.5).abs() < 1e-6);

        let mut roi = BinaryMask::zeros((2, 5));
        roi[(0, 4)] = true;
        let r = mean_filter_response(&image, &bank, Some(&roi), 0.0);
        assert_eq!(r[(0, 4)], 1.0);
        assert_eq!(r[(1, 4)], 0.0);
    }
}
