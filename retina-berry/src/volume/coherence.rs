//! 基于线段结构元的三维一致性滤波: 只有一段足够长, 足够直的前景穿过的体素才被保留.

use super::line::{LineBank, LineBankCache, LineBankKind, LineBankParams, OrientedLine};
use super::{check_volume, is_set};
use crate::consts::gray::{is_voxel_foreground, VOXEL_BACKGROUND, VOXEL_FOREGROUND};
use crate::error::{ConfigError, ConfigResult};
use crate::morph::StructElem2d;
use crate::{Idx3d, Volume};
use log::{info, warn};
use ndarray::{Array3, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 保留判据.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CoherenceCriterion {
    /// 存在一条线段, 其前景体素数 `> size * threshold`.
    AnyLine {
        /// 单条线段的前景比例下限.
        threshold: f32,
    },

    /// 通过的线段数 `> len * overall`.
    Fraction {
        /// 单条线段的前景比例下限.
        threshold: f32,
        /// 通过线段的比例下限.
        overall: f32,
    },

    /// `+` 侧最长走通线段与 `-` 侧最长走通线段的体素数之和 `> length`.
    ///
    /// 这里线段只需走完 (不触发提前停止), 不再检查最终的前景比例.
    TwoSided {
        /// 单条线段的前景比例下限.
        threshold: f32,
    },

    /// 通过线段覆盖的方向桶中, 最长的环形连续段足够长.
    AngularCoverage {
        /// 单条线段的前景比例下限.
        threshold: f32,
        /// 方向覆盖比例下限.
        overall: f32,
        /// 切片内半径 `length` 的圆盘全为前景时直接保留.
        prefilter: bool,
    },
}

impl CoherenceCriterion {
    /// 该判据需要的线段组类型.
    pub fn bank_kind(&self) -> LineBankKind {
        match self {
            Self::AnyLine { .. } | Self::Fraction { .. } => LineBankKind::Unique,
            Self::TwoSided { .. } => LineBankKind::Stepped,
            Self::AngularCoverage { .. } => LineBankKind::Coverage,
        }
    }

    fn threshold(&self) -> f32 {
        match *self {
            Self::AnyLine { threshold }
            | Self::Fraction { threshold, .. }
            | Self::TwoSided { threshold }
            | Self::AngularCoverage { threshold, .. } => threshold,
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        let th = self.threshold();
        if !(0.0..=1.0).contains(&th) {
            return Err(ConfigError::InvalidParameter {
                name: "threshold",
                reason: "must be within [0, 1]",
            });
        }
        match *self {
            Self::Fraction { overall, .. } | Self::AngularCoverage { overall, .. } if !overall.is_finite() => {
                Err(ConfigError::InvalidParameter {
                    name: "overall",
                    reason: "must be finite",
                })
            }
            _ => Ok(()),
        }
    }
}

/// 滤波结果.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterOutcome {
    /// 输出体数据, 取值 `0` 或 `1` (ROI 外为输入原值).
    pub output: Volume<u8>,

    /// 被删除的前景体素个数.
    pub removed: usize,
}

/// 一致性滤波器. 线段组构造后只读, 可以在多个线程间共享.
#[derive(Clone, Debug)]
pub struct CoherenceFilter {
    bank: LineBank,
    criterion: CoherenceCriterion,
    disk: StructElem2d,
}

impl CoherenceFilter {
    /// 由线段组与判据构造. 线段组一般应由 `criterion.bank_kind()` 构造.
    pub fn new(bank: LineBank, criterion: CoherenceCriterion) -> ConfigResult<Self> {
        criterion.validate()?;
        if bank.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "bank",
                reason: "line bank is empty",
            });
        }
        if matches!(criterion, CoherenceCriterion::AngularCoverage { .. }) && bank.num_alphas() == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "bank",
                reason: "angular coverage needs at least one alpha bin",
            });
        }
        let disk = StructElem2d::disk(bank.length().max(0.0) as usize);
        Ok(Self { bank, criterion, disk })
    }

    /// 构造线段组 (若提供 `cache` 则先查缓存) 并构造滤波器.
    ///
    /// 缓存读写失败时退回到直接构造.
    pub fn build(
        params: &LineBankParams,
        criterion: CoherenceCriterion,
        cache: Option<&LineBankCache>,
    ) -> ConfigResult<Self> {
        let kind = criterion.bank_kind();
        let bank = match cache.map(|c| c.load_or_build(kind, params)) {
            Some(Ok(bank)) => bank,
            Some(Err(e)) => {
                warn!("line bank cache unavailable, building in memory: {e}");
                LineBank::build(kind, params)?
            }
            None => LineBank::build(kind, params)?,
        };
        Self::new(bank, criterion)
    }

    /// 所用线段组.
    #[inline]
    pub fn bank(&self) -> &LineBank {
        &self.bank
    }

    /// 所用判据.
    #[inline]
    pub fn criterion(&self) -> &CoherenceCriterion {
        &self.criterion
    }

    /// 对整个体数据做一次滤波, 结果写入新的体数据.
    ///
    /// - `roi` 外 (值为 0) 的体素原样复制;
    /// - 背景体素输出 0;
    /// - `keep` 内的前景体素原样复制;
    /// - 其余前景体素按判据输出 1 或 0.
    ///
    /// 越界采样按 `input` 的边界模式读取.
    pub fn apply(
        &self,
        input: &Volume<u8>,
        keep: Option<&Volume<u8>>,
        roi: Option<&Volume<u8>>,
    ) -> ConfigResult<FilterOutcome> {
        let shape = input.shape();
        for v in keep.iter().chain(roi.iter()) {
            check_volume(shape, v.shape())?;
        }

        let mut out = Array3::<u8>::zeros(shape);
        let decide = |pos: Idx3d, o: &mut u8| {
            let v = input[pos];
            *o = if roi.is_some_and(|r| !is_set(r, pos)) {
                v
            } else if !is_voxel_foreground(v) {
                VOXEL_BACKGROUND
            } else if keep.is_some_and(|k| is_set(k, pos)) {
                v
            } else if self.keeps(input, roi, pos) {
                VOXEL_FOREGROUND
            } else {
                VOXEL_BACKGROUND
            };
        };
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                Zip::indexed(&mut out).par_for_each(decide);
            } else {
                Zip::indexed(&mut out).for_each(decide);
            }
        }

        let output = Volume::new(out).with_border_mode(input.border_mode());
        let removed = Zip::from(&input.view())
            .and(&output.view())
            .fold(0, |acc, &i, &o| {
                acc + usize::from(is_voxel_foreground(i) && !is_voxel_foreground(o))
            });
        info!(
            "coherence filter: {} of {} foreground voxels removed",
            removed,
            input.count_foreground()
        );
        Ok(FilterOutcome { output, removed })
    }

    /// 单个前景体素是否保留.
    fn keeps(&self, input: &Volume<u8>, roi: Option<&Volume<u8>>, pos: Idx3d) -> bool {
        let th = self.criterion.threshold();
        match self.criterion {
            CoherenceCriterion::AnyLine { .. } => {
                self.bank.lines().iter().any(|l| passes(LineSamples::new(input, pos, l), l.len(), th))
            }
            CoherenceCriterion::Fraction { overall, .. } => {
                let ok = self
                    .bank
                    .lines()
                    .iter()
                    .filter(|l| passes(LineSamples::new(input, pos, l), l.len(), th))
                    .count();
                ok as f32 > self.bank.len() as f32 * overall
            }
            CoherenceCriterion::TwoSided { .. } => {
                let longest = |plus: bool| {
                    let mut longest = 0;
                    for l in self.bank.lines().iter().filter(|l| (l.length() > 0.0) == plus) {
                        if l.len() > longest && walks_through(LineSamples::new(input, pos, l), l.len(), th).is_some() {
                            longest = l.len();
                        }
                    }
                    longest
                };
                (longest(true) + longest(false)) as f32 > self.bank.length()
            }
            CoherenceCriterion::AngularCoverage {
                overall, prefilter, ..
            } => {
                (prefilter && self.disk_is_foreground(input, pos))
                    || self.angular_coverage(input, roi, pos, th, overall)
            }
        }
    }

    fn disk_is_foreground(&self, input: &Volume<u8>, (z, h, w): Idx3d) -> bool {
        self.disk.offsets().iter().all(|&(dh, dw)| {
            is_voxel_foreground(input.get_bordered((z as isize, h as isize + dh, w as isize + dw)))
        })
    }

    fn angular_coverage(
        &self,
        input: &Volume<u8>,
        roi: Option<&Volume<u8>>,
        pos: Idx3d,
        th: f32,
        overall: f32,
    ) -> bool {
        let bins = self.bank.num_alphas();
        let mut covered = vec![false; bins];
        let mut outside = 0usize;
        for line in self.bank.lines() {
            let size = line.len() as f32;
            let mut n = 0usize;
            let mut ok = true;
            for (k, &d) in line.offsets().iter().enumerate() {
                let p = offset(pos, d);
                if roi.is_some_and(|r| r.get_bordered(p) == 0) {
                    outside += 1;
                    ok = false;
                    break;
                }
                n += usize::from(is_voxel_foreground(input.get_bordered(p)));
                if (k + 1 - n) as f32 > size * (1.0 - th) {
                    ok = false;
                    break;
                }
            }
            if ok && n as f32 >= size * th {
                for &b in line.covered() {
                    covered[b] = true;
                }
            }
        }
        let lines = self.bank.len() as f32;
        let needed = bins as f32 * (lines - outside as f32) / lines
            * overall
            * self.bank.reduced_count() as f32
            / self.bank.original_count().max(1) as f32;
        longest_circular_run(&covered) as f32 > needed
    }
}

/// 沿线段读取的体素值序列.
struct LineSamples<'a> {
    input: &'a Volume<u8>,
    center: Idx3d,
    offsets: std::slice::Iter<'a, crate::Offset3d>,
}

impl<'a> LineSamples<'a> {
    fn new(input: &'a Volume<u8>, center: Idx3d, line: &'a OrientedLine) -> Self {
        Self {
            input,
            center,
            offsets: line.offsets().iter(),
        }
    }
}

impl Iterator for LineSamples<'_> {
    type Item = bool;

    #[inline]
    fn next(&mut self) -> Option<bool> {
        let &d = self.offsets.next()?;
        Some(is_voxel_foreground(self.input.get_bordered(offset(self.center, d))))
    }
}

#[inline]
fn offset((z, h, w): Idx3d, (dz, dh, dw): crate::Offset3d) -> (isize, isize, isize) {
    (z as isize + dz, h as isize + dh, w as isize + dw)
}

/// 沿线段逐个采样, 第 `k` 个采样后若 `k - n > size * (1 - th)` 则提前停止.
///
/// # 返回值
///
/// 完整走完时返回前景数 `n`, 提前停止时返回 `None`.
fn walks_through<I: Iterator<Item = bool>>(samples: I, size: usize, th: f32) -> Option<usize> {
    let limit = size as f32 * (1.0 - th);
    let mut n = 0usize;
    for (k, fg) in samples.enumerate() {
        n += usize::from(fg);
        if k as f32 - n as f32 > limit {
            return None;
        }
    }
    Some(n)
}

/// 单条线段是否通过: 完整走完且前景数 `> size * th`.
fn passes<I: Iterator<Item = bool>>(samples: I, size: usize, th: f32) -> bool {
    walks_through(samples, size, th).is_some_and(|n| n as f32 > size as f32 * th)
}

/// 环形布尔序列中最长的连续 `true` 段长度.
fn longest_circular_run(bins: &[bool]) -> usize {
    if bins.iter().all(|&b| b) {
        return bins.len();
    }
    let (mut best, mut cur) = (0, 0);
    for &b in bins.iter().chain(bins.iter()) {
        cur = if b { cur + 1 } else { 0 };
        best = best.max(cur);
    }
    best
}
