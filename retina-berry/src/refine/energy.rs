//! 单像素边缘能量.

use super::{Phase, RefineParams};
use crate::calibration::{CalibrationTable, DesiredSlopes};
use crate::consts::gray::is_foreground;
use crate::feature::PixelFeatures;
use crate::{Idx2d, LabelImage};

/// 边缘能量函数. 只读, 可在线程间共享.
///
/// 能量 = 斜率项 + `nw` * 邻域项, 越小越好. 所有数值退化 (动态范围过低,
/// 标定表缺失, 斜率比缺失, 期望斜率相等) 都按 0 能量处理.
#[derive(Clone, Debug)]
pub struct EdgeEnergy<'a> {
    table: &'a CalibrationTable,
    imult: f32,
    omult: f32,
    nw: f32,
    dynth: f32,
    thin_width: f32,
}

impl<'a> EdgeEnergy<'a> {
    /// 由标定表和参数构造.
    pub fn new(table: &'a CalibrationTable, params: &RefineParams) -> Self {
        Self {
            table,
            imult: params.imult,
            omult: params.omult,
            nw: params.neighbour_weight,
            dynth: params.dynth,
            thin_width: params.thin_width,
        }
    }

    /// 修正后的期望斜率.
    ///
    /// `imult < 1` 时两侧分别乘以 `imult`, `omult`; 否则两侧都以
    /// `1 - (1 - x) / imult` 向 1 压缩.
    pub fn corrected_slopes(&self, width: f32, dyn_range: f32) -> Option<DesiredSlopes> {
        let DesiredSlopes { inner, outer } = self.table.desired_slopes(width, dyn_range)?;
        Some(if self.imult < 1.0 {
            DesiredSlopes {
                inner: inner * self.imult,
                outer: outer * self.omult,
            }
        } else {
            DesiredSlopes {
                inner: 1.0 - (1.0 - inner) / self.imult,
                outer: 1.0 - (1.0 - outer) / self.imult,
            }
        })
    }

    /// 假设 `pos` 的标签为 `label` 时的能量.
    ///
    /// 邻域项参考 `reference` (扫描开始时的快照), 统计 8-邻域内与 `label`
    /// 相同的像素个数 `nn`, 取 `1 - nn / 8`. 图像外视为背景.
    pub fn energy(
        &self,
        label: u8,
        feat: PixelFeatures,
        reference: &LabelImage,
        pos: Idx2d,
        phase: Phase,
    ) -> f32 {
        if feat.dyn_range < self.dynth {
            return 0.0;
        }
        let Some(slopes) = self.corrected_slopes(feat.width, feat.dyn_range) else {
            return 0.0;
        };
        let Some(value) = feat.ri else {
            return 0.0;
        };
        let Some(slope) = slope_term(label, value, slopes, false) else {
            return 0.0;
        };
        let neighbourhood = if feat.width < self.thin_width && phase == Phase::Inner {
            0.0
        } else {
            1.0 - reference.count_n8_equal(pos, label) as f32 / 8.0
        };
        slope + self.nw * neighbourhood
    }

    /// 误差摘要使用的能量变体.
    ///
    /// 与 `energy` 的区别: 无法评估时返回 `None` 而不是 0; 背景一侧使用严格比较
    /// `value > outer`; 不做细血管抑制.
    pub fn error(&self, label: u8, feat: PixelFeatures, reference: &LabelImage, pos: Idx2d) -> Option<f32> {
        if feat.dyn_range < self.dynth {
            return None;
        }
        let slopes = self.corrected_slopes(feat.width, feat.dyn_range)?;
        let slope = slope_term(label, feat.ri?, slopes, true)?;
        let neighbourhood = 1.0 - reference.count_n8_equal(pos, label) as f32 / 8.0;
        Some(slope + self.nw * neighbourhood)
    }
}

/// 单侧线性斜坡, 不截断. 期望斜率相等时返回 `None`.
fn slope_term(label: u8, value: f32, s: DesiredSlopes, strict_bg: bool) -> Option<f32> {
    let span = s.outer - s.inner;
    if span == 0.0 {
        return None;
    }
    Some(if is_foreground(label) {
        if value < s.inner {
            0.0
        } else {
            (value - s.inner) / span
        }
    } else {
        let done = if strict_bg { value > s.outer } else { value >= s.outer };
        if done {
            0.0
        } else {
            (s.outer - value) / span
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Bucket;
    use crate::consts::gray::{LABEL_BACKGROUND, LABEL_FOREGROUND};
    use crate::consts::CALIBRATION_BUCKETS;

    fn f32_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    /// 处处 inner = 0.2, outer = 0.8.
    fn table() -> CalibrationTable {
        let b = Bucket {
            inner: vec![0.2; 100],
            outer: vec![0.8; 100],
        };
        CalibrationTable::from_buckets(vec![b; CALIBRATION_BUCKETS]).unwrap()
    }

    fn feat(ri: f32) -> PixelFeatures {
        PixelFeatures {
            width: 4.0,
            dyn_range: 30.0,
            ri: Some(ri),
        }
    }

    #[test]
    fn test_slope_ramps() {
        let t = table();
        let p = RefineParams {
            neighbour_weight: 0.0,
            ..Default::default()
        };
        let e = EdgeEnergy::new(&t, &p);
        let r = LabelImage::background((3, 3));
        let at = |label, v| e.energy(label, feat(v), &r, (1, 1), Phase::Outer);

        assert_eq!(at(LABEL_FOREGROUND, 0.1), 0.0);
        assert!(f32_eq(at(LABEL_FOREGROUND, 0.5), 0.5));
        // 不截断.
        assert!(f32_eq(at(LABEL_FOREGROUND, 1.4), 2.0));
        assert_eq!(at(LABEL_BACKGROUND, 0.8), 0.0);
        assert!(f32_eq(at(LABEL_BACKGROUND, 0.5), 0.5));

        // 前景: value > inner 时单调不减; 背景: 单调不增, 在 outer 处归零.
        let vs: Vec<f32> = (0..=20).map(|i| 0.2 + 0.03 * i as f32).collect();
        for w in vs.windows(2) {
            assert!(at(LABEL_FOREGROUND, w[0]) <= at(LABEL_FOREGROUND, w[1]));
            assert!(at(LABEL_BACKGROUND, w[0]) >= at(LABEL_BACKGROUND, w[1]));
        }
    }

    #[test]
    fn test_degenerate_cases_are_zero() {
        let t = table();
        let p = RefineParams::default();
        let e = EdgeEnergy::new(&t, &p);
        let r = LabelImage::background((3, 3));
        let mut f = feat(0.5);
        f.dyn_range = 5.0;
        assert_eq!(e.energy(LABEL_FOREGROUND, f, &r, (1, 1), Phase::Outer), 0.0);
        assert_eq!(e.error(LABEL_FOREGROUND, f, &r, (1, 1)), None);
        let mut f = feat(0.5);
        f.ri = None;
        assert_eq!(e.energy(LABEL_FOREGROUND, f, &r, (1, 1), Phase::Outer), 0.0);

        // imult < 1 且 omult 使两侧相等.
        let p = RefineParams {
            imult: 0.5,
            omult: 0.125,
            ..Default::default()
        };
        let e = EdgeEnergy::new(&t, &p);
        let s = e.corrected_slopes(4.0, 30.0).unwrap();
        assert!(f32_eq(s.inner, 0.1) && f32_eq(s.outer, 0.1));
        assert_eq!(e.energy(LABEL_FOREGROUND, feat(0.5), &r, (1, 1), Phase::Outer), 0.0);
        assert_eq!(e.error(LABEL_FOREGROUND, feat(0.5), &r, (1, 1)), None);
    }

    #[test]
    fn test_imult_compression() {
        let t = table();
        let p = RefineParams {
            imult: 2.0,
            ..Default::default()
        };
        let s = EdgeEnergy::new(&t, &p).corrected_slopes(4.0, 30.0).unwrap();
        assert!(f32_eq(s.inner, 0.6));
        assert!(f32_eq(s.outer, 0.9));
    }

    #[test]
    fn test_neighbourhood_and_thin_suppression() {
        let t = table();
        let p = RefineParams::default();
        let e = EdgeEnergy::new(&t, &p);
        // 中心前景, 8 个邻居中 2 个前景.
        let mut r = LabelImage::background((3, 3));
        r[(0, 1)] = LABEL_FOREGROUND;
        r[(1, 0)] = LABEL_FOREGROUND;
        // value = inner, 斜率项为 0.
        let v = e.energy(LABEL_FOREGROUND, feat(0.2), &r, (1, 1), Phase::Outer);
        assert!(f32_eq(v, 1.7 * 0.75));
        let v = e.energy(LABEL_BACKGROUND, feat(0.8), &r, (1, 1), Phase::Outer);
        assert!(f32_eq(v, 1.7 * 0.25));

        let mut thin = feat(0.1);
        thin.width = 1.5;
        assert_eq!(e.energy(LABEL_FOREGROUND, thin, &r, (1, 1), Phase::Inner), 0.0);
        assert!(e.energy(LABEL_FOREGROUND, thin, &r, (1, 1), Phase::Outer) > 0.0);
        // 误差变体不做抑制, 背景使用严格比较.
        assert!(f32_eq(e.error(LABEL_FOREGROUND, thin, &r, (1, 1)).unwrap(), 1.7 * 0.75));
        assert!(f32_eq(e.error(LABEL_BACKGROUND, feat(0.8), &r, (1, 1)).unwrap(), 1.7 * 0.25));
    }
}
