//! 方向性扫描清理: 从起始切片出发逐片传播 "已确认" 标记, 没有被传播到的前景体素被删除.

use super::check_volume;
use crate::consts::gray::{
    is_voxel_foreground, VOXEL_BACKGROUND, VOXEL_CONFIRMED, VOXEL_FOREGROUND,
};
use crate::data::shift;
use crate::error::{ConfigError, ConfigResult};
use crate::morph::StructElem2d;
use crate::refine::{CancelToken, Terminal};
use crate::{Idx2d, Volume};
use log::{debug, info};
use ndarray::{Array3, ArrayView3, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 扫描方向所沿的坐标轴.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SweepAxis {
    /// 沿 z, 切片为 `(h, w)`.
    Axial,

    /// 沿 h, 切片为 `(z, w)`.
    Coronal,

    /// 沿 w, 切片为 `(z, h)`.
    Sagittal,
}

impl SweepAxis {
    /// 全部三个方向, 按轴向, 冠状, 矢状顺序.
    pub const ALL: [SweepAxis; 3] = [SweepAxis::Axial, SweepAxis::Coronal, SweepAxis::Sagittal];

    /// 在 `Volume` 中的轴编号.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            SweepAxis::Axial => 0,
            SweepAxis::Coronal => 1,
            SweepAxis::Sagittal => 2,
        }
    }

    /// 把该轴换到第 0 维的轴排列.
    #[inline]
    fn permutation(self) -> [usize; 3] {
        match self {
            SweepAxis::Axial => [0, 1, 2],
            SweepAxis::Coronal => [1, 0, 2],
            SweepAxis::Sagittal => [2, 0, 1],
        }
    }

    /// `permutation` 的逆.
    #[inline]
    fn inverse(self) -> [usize; 3] {
        match self {
            SweepAxis::Axial => [0, 1, 2],
            SweepAxis::Coronal => [1, 0, 2],
            SweepAxis::Sagittal => [1, 2, 0],
        }
    }
}

/// 单次扫描结果.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepOutcome {
    /// 输出体数据.
    pub output: Volume<u8>,

    /// 与输入不同的体素个数.
    pub changed: usize,
}

/// 单方向扫描算子. 切片内的可达范围是半径 `radius` 的圆盘.
#[derive(Clone, Debug)]
pub struct DirectionalSweep {
    reach: StructElem2d,
}

impl DirectionalSweep {
    /// 切片内可达半径为 `radius`.
    pub fn new(radius: usize) -> Self {
        Self {
            reach: StructElem2d::disk(radius),
        }
    }

    /// 沿 z 从切片 `begin` 扫描到切片 `end` (含), `begin > end` 时反向扫描.
    ///
    /// 1. `begin` 上的前景被确认;
    /// 2. 之后每一片上的前景体素, 若上一片在可达偏移处有已确认体素, 或者它在
    ///   `keep` 内, 则被确认;
    /// 3. `begin` 之后的切片中, `roi` 内的体素输出 "是否已确认" (1 或 0),
    ///   其余体素原样复制.
    ///
    /// `begin == end` 时输出等于输入.
    pub fn pass(
        &self,
        input: &Volume<u8>,
        begin: usize,
        end: usize,
        keep: Option<&Volume<u8>>,
        roi: Option<&Volume<u8>>,
    ) -> ConfigResult<SweepOutcome> {
        self.pass_axis(SweepAxis::Axial, input, begin, end, keep, roi)
    }

    /// 同 [`Self::pass`], 但沿 `axis` 扫描.
    pub fn pass_axis(
        &self,
        axis: SweepAxis,
        input: &Volume<u8>,
        begin: usize,
        end: usize,
        keep: Option<&Volume<u8>>,
        roi: Option<&Volume<u8>>,
    ) -> ConfigResult<SweepOutcome> {
        let shape = input.shape();
        for v in keep.iter().chain(roi.iter()) {
            check_volume(shape, v.shape())?;
        }
        let len = input.view().len_of(Axis(axis.index()));
        if begin >= len || end >= len {
            return Err(ConfigError::InvalidParameter {
                name: "begin",
                reason: "sweep range exceeds the volume",
            });
        }
        let perm = axis.permutation();
        let (out, changed) = self.pass_along(
            input.view().permuted_axes(perm),
            begin,
            end,
            keep.map(|k| k.view().permuted_axes(perm)),
            roi.map(|r| r.view().permuted_axes(perm)),
        );
        let output = restore(out, axis, input);
        Ok(SweepOutcome { output, changed })
    }

    /// 沿第 0 维扫描.
    fn pass_along(
        &self,
        input: ArrayView3<u8>,
        begin: usize,
        end: usize,
        keep: Option<ArrayView3<u8>>,
        roi: Option<ArrayView3<u8>>,
    ) -> (Array3<u8>, usize) {
        let steps = slice_steps(begin, end);
        let mut tmp = input.to_owned();
        tmp.index_axis_mut(Axis(0), begin).mapv_inplace(|v| {
            if is_voxel_foreground(v) {
                VOXEL_CONFIRMED
            } else {
                v
            }
        });

        let mut removed = 0;
        for &(prev, cur) in &steps {
            let before = tmp.index_axis(Axis(0), prev).to_owned();
            let keep_s = keep.map(|k| k.index_axis_move(Axis(0), cur));
            let dim = before.dim();
            let confirm = |pos: Idx2d, v: &mut u8| {
                if !is_voxel_foreground(*v) {
                    return;
                }
                let reached = keep_s.is_some_and(|k| k[pos] != 0)
                    || self.reach.offsets().iter().any(|&d| {
                        shift(pos, d, dim).is_some_and(|p| before[p] == VOXEL_CONFIRMED)
                    });
                if reached {
                    *v = VOXEL_CONFIRMED;
                }
            };
            let mut slice = tmp.index_axis_mut(Axis(0), cur);
            cfg_if::cfg_if! {
                if #[cfg(feature = "rayon")] {
                    Zip::indexed(&mut slice).par_for_each(confirm);
                } else {
                    Zip::indexed(&mut slice).for_each(confirm);
                }
            }
            removed += slice
                .iter()
                .filter(|&&v| is_voxel_foreground(v) && v != VOXEL_CONFIRMED)
                .count();
        }
        debug!("sweep {begin} -> {end}: {removed} voxels not reached");

        let mut out = input.to_owned();
        for &(_, cur) in &steps {
            let confirmed = tmp.index_axis(Axis(0), cur);
            let roi_s = roi.map(|r| r.index_axis_move(Axis(0), cur));
            Zip::indexed(out.index_axis_mut(Axis(0), cur))
                .and(&confirmed)
                .for_each(|pos, o, &t| {
                    if roi_s.map_or(true, |r| r[pos] != 0) {
                        *o = if t == VOXEL_CONFIRMED {
                            VOXEL_FOREGROUND
                        } else {
                            VOXEL_BACKGROUND
                        };
                    }
                });
        }
        let changed = Zip::from(&input)
            .and(&out)
            .fold(0, |acc, &i, &o| acc + usize::from(i != o));
        (out, changed)
    }
}

/// `begin` 之后依次访问的 `(上一片, 当前片)`.
fn slice_steps(begin: usize, end: usize) -> Vec<(usize, usize)> {
    if begin <= end {
        (begin + 1..=end).map(|i| (i - 1, i)).collect()
    } else {
        (end..begin).rev().map(|i| (i + 1, i)).collect()
    }
}

/// 把第 0 维换回 `axis`, 并整理为标准内存布局.
fn restore(data: Array3<u8>, axis: SweepAxis, like: &Volume<u8>) -> Volume<u8> {
    let data = data
        .permuted_axes(axis.inverse())
        .as_standard_layout()
        .into_owned();
    Volume::new(data).with_border_mode(like.border_mode())
}

/// 迭代清理的参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CleaningParams {
    /// 切片内可达半径.
    pub radius: usize,

    /// 最多进行的轮数.
    pub max_rounds: u32,

    /// 每轮依次扫描的方向.
    pub axes: Vec<SweepAxis>,

    /// 中间切片的随机种子.
    pub seed: u64,
}

impl Default for CleaningParams {
    fn default() -> Self {
        Self {
            radius: 1,
            max_rounds: 10,
            axes: SweepAxis::ALL.to_vec(),
            seed: 0,
        }
    }
}

impl CleaningParams {
    /// 检查参数合法性.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.axes.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "axes",
                reason: "at least one sweep axis is required",
            });
        }
        Ok(())
    }
}

/// 迭代清理的摘要.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CleaningReport {
    rounds: Vec<usize>,
    terminal: Terminal,
}

impl CleaningReport {
    /// 每轮修改的体素个数.
    #[inline]
    pub fn rounds(&self) -> &[usize] {
        &self.rounds
    }

    /// 终止状态.
    #[inline]
    pub fn terminal(&self) -> Terminal {
        self.terminal
    }

    /// 修改的体素总数.
    #[inline]
    pub fn changed_total(&self) -> usize {
        self.rounds.iter().sum()
    }
}

/// 迭代清理: 每轮对每个方向做一次往返扫描, 直到某轮没有修改.
#[derive(Clone, Debug)]
pub struct RegionCleaningPass {
    sweep: DirectionalSweep,
    params: CleaningParams,
}

impl RegionCleaningPass {
    /// 构造. 参数非法时返回 `Err`.
    pub fn new(params: CleaningParams) -> ConfigResult<Self> {
        params.validate()?;
        Ok(Self {
            sweep: DirectionalSweep::new(params.radius),
            params,
        })
    }

    /// 参数.
    #[inline]
    pub fn params(&self) -> &CleaningParams {
        &self.params
    }

    /// 就地清理 `volume`.
    ///
    /// 取消时当前轮已完成的方向保留其结果.
    pub fn run(
        &self,
        volume: &mut Volume<u8>,
        keep: Option<&Volume<u8>>,
        roi: Option<&Volume<u8>>,
        cancel: &CancelToken,
    ) -> ConfigResult<CleaningReport> {
        let shape = volume.shape();
        for v in keep.iter().chain(roi.iter()) {
            check_volume(shape, v.shape())?;
        }
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut rounds = Vec::new();
        let terminal = 'outer: loop {
            if rounds.len() as u32 >= self.params.max_rounds {
                break Terminal::BudgetExhausted;
            }
            let mut changed = 0;
            for &axis in &self.params.axes {
                if cancel.is_cancelled() {
                    if changed > 0 {
                        rounds.push(changed);
                    }
                    break 'outer Terminal::Cancelled;
                }
                changed += self.clean_axis(volume, axis, keep, roi, &mut rng)?;
            }
            info!("cleaning round {}: {changed} voxels changed", rounds.len());
            rounds.push(changed);
            if changed == 0 {
                break Terminal::Converged;
            }
        };
        info!(
            "region cleaning finished ({terminal:?}) after {} rounds, {} voxels changed",
            rounds.len(),
            rounds.iter().sum::<usize>()
        );
        Ok(CleaningReport { rounds, terminal })
    }

    /// 沿 `axis` 做一次往返扫描: `first -> middle -> last -> middle -> first`.
    ///
    /// `first`, `last` 为 `roi` 沿该轴的范围 (没有 `roi` 时为整个体数据),
    /// `middle` 在两者之间随机选取. 三个切片中任意一个不含前景时什么也不做.
    ///
    /// # 返回值
    ///
    /// 四次扫描修改的体素个数之和.
    pub fn clean_axis<R: Rng>(
        &self,
        volume: &mut Volume<u8>,
        axis: SweepAxis,
        keep: Option<&Volume<u8>>,
        roi: Option<&Volume<u8>>,
        rng: &mut R,
    ) -> ConfigResult<usize> {
        let ax = Axis(axis.index());
        let len = volume.view().len_of(ax);
        let extent = match roi {
            Some(r) => {
                let mut set = (0..len).filter(|&i| r.view().index_axis(ax, i).iter().any(|&v| v != 0));
                set.next().map(|first| (first, set.last().unwrap_or(first)))
            }
            None => len.checked_sub(1).map(|last| (0, last)),
        };
        let Some((first, last)) = extent else {
            return Ok(0);
        };
        let middle = rng.gen_range(first..=last);
        if [first, middle, last].iter().any(|&i| volume.is_slice_empty(ax, i)) {
            debug!("{axis:?}: slices {first}/{middle}/{last} include an empty slice, skipped");
            return Ok(0);
        }
        debug!("{axis:?}: first {first}, middle {middle}, last {last}");

        let perm = axis.permutation();
        let keep = keep.map(|k| k.view().permuted_axes(perm));
        let roi = roi.map(|r| r.view().permuted_axes(perm));
        let (a, c0) = self.sweep.pass_along(volume.view().permuted_axes(perm), first, middle, keep, roi);
        let (b, c1) = self.sweep.pass_along(a.view(), middle, last, keep, roi);
        let (c, c2) = self.sweep.pass_along(b.view(), last, middle, keep, roi);
        let (d, c3) = self.sweep.pass_along(c.view(), middle, first, keep, roi);
        *volume = restore(d, axis, volume);
        Ok(c0 + c1 + c2 + c3)
    }
}
