//! 随机局部搜索优化器.

use super::guard::would_disconnect;
use super::{BoundaryMaskBuilder, EdgeEnergy, Phase, RefineParams};
use crate::calibration::CalibrationTable;
use crate::consts::gray::{flipped, is_foreground, LABEL_BACKGROUND};
use crate::data::{shift, N9};
use crate::error::{ConfigError, ConfigResult};
use crate::feature::{BoundaryDescriptor, EqualSlopeDescriptor, FeatureCache};
use crate::morph::NeighborOffsetTable;
use crate::{BinaryMask, Idx2d, IntensityImage, LabelImage};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 取消令牌. 可克隆后交给其他线程; 优化器在每次外层迭代和每次扫描开始前检查.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 新建未取消的令牌.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// 是否已请求取消.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 终止状态.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Terminal {
    /// 某次外层迭代的第一次扫描没有任何修改.
    Converged,

    /// 外层迭代次数用完.
    BudgetExhausted,

    /// 被取消. 标签已恢复为最近一次完整外层迭代的结果.
    Cancelled,
}

/// 一次运行的摘要.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefineReport {
    terminal: Terminal,
    iterations: u32,
    sweeps: Vec<Vec<usize>>,
    error: Option<f32>,
}

impl RefineReport {
    /// 终止状态.
    #[inline]
    pub fn terminal(&self) -> Terminal {
        self.terminal
    }

    /// 完整执行的外层迭代次数.
    #[inline]
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// 每次外层迭代中, 每次扫描的修改个数.
    #[inline]
    pub fn sweeps(&self) -> &[Vec<usize>] {
        &self.sweeps
    }

    /// 总修改个数.
    pub fn changed_total(&self) -> usize {
        self.sweeps.iter().flatten().sum()
    }

    /// 误差摘要. 未计算或没有可评估像素时为 `None`.
    #[inline]
    pub fn error(&self) -> Option<f32> {
        self.error
    }
}

/// 以默认描述子运行一次边缘精化.
///
/// 等价于 `EdgeRefiner::new(table, EqualSlopeDescriptor::default(), params)?.run(..)`,
/// 不支持取消.
pub fn refine_edges(
    table: &CalibrationTable,
    image: &IntensityImage,
    labels: &mut LabelImage,
    roi: Option<&BinaryMask>,
    params: RefineParams,
) -> ConfigResult<RefineReport> {
    EdgeRefiner::new(table, EqualSlopeDescriptor::default(), params)?.run(
        image,
        labels,
        roi,
        &CancelToken::new(),
    )
}

/// 边缘精化优化器.
///
/// 状态机: `Init -> (Inner | Outer)* -> Converged | BudgetExhausted | Cancelled`.
///
/// 每次外层迭代:
///
/// 1. 按阶段构造候选掩膜;
/// 2. 重建特征缓存;
/// 3. 至多 `max_sweeps` 次扫描. 每次扫描有放回地采样 `oversampling * N` 个候选像素,
///   对每个样本比较翻转前后能量, 严格变小才保留翻转; 某次扫描没有修改则提前结束;
/// 4. 记录当前标签为最优结果.
///
/// 若某次外层迭代的第一次扫描就没有修改, 则视为收敛, 与 `max_iterations` 无关.
pub struct EdgeRefiner<'a, D: BoundaryDescriptor> {
    table: &'a CalibrationTable,
    descriptor: D,
    params: RefineParams,
}

impl<'a, D: BoundaryDescriptor> EdgeRefiner<'a, D> {
    /// 构造优化器. 参数非法时返回 `Err`.
    pub fn new(table: &'a CalibrationTable, descriptor: D, params: RefineParams) -> ConfigResult<Self> {
        params.validate()?;
        Ok(Self {
            table,
            descriptor,
            params,
        })
    }

    /// 参数.
    #[inline]
    pub fn params(&self) -> &RefineParams {
        &self.params
    }

    /// 就地精化 `labels`.
    ///
    /// 只有 `roi` (若有) 内的像素会被修改. 形状不一致时返回 `Err`,
    /// 其他任何数值问题都不会报错.
    pub fn run(
        &self,
        image: &IntensityImage,
        labels: &mut LabelImage,
        roi: Option<&BinaryMask>,
        cancel: &CancelToken,
    ) -> ConfigResult<RefineReport> {
        let shape = labels.shape();
        check_shape(shape, image.shape())?;
        if let Some(r) = roi {
            check_shape(shape, r.shape())?;
        }
        RunImp {
            refiner: self,
            image,
            roi,
            builder: BoundaryMaskBuilder::new(labels),
            energy: EdgeEnergy::new(self.table, &self.params),
            guard: self.params.connectivity.table(),
            cache: FeatureCache::new(shape),
            rng: StdRng::seed_from_u64(self.params.seed),
        }
        .run(labels, cancel)
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

/// `EdgeRefiner::run` 的实现细节, 持有一次运行的私有缓冲区.
struct RunImp<'r, 'a, D: BoundaryDescriptor> {
    refiner: &'r EdgeRefiner<'a, D>,
    image: &'r IntensityImage,
    roi: Option<&'r BinaryMask>,
    builder: BoundaryMaskBuilder,
    energy: EdgeEnergy<'a>,
    guard: NeighborOffsetTable,
    cache: FeatureCache,
    rng: StdRng,
}

impl<D: BoundaryDescriptor> RunImp<'_, '_, D> {
    fn run(mut self, labels: &mut LabelImage, cancel: &CancelToken) -> ConfigResult<RefineReport> {
        let params = self.refiner.params;
        let start = Instant::now();
        let mut best = labels.clone();
        let mut sweeps: Vec<Vec<usize>> = Vec::new();
        let mut iteration = 0u32;

        let terminal = loop {
            if cancel.is_cancelled() {
                break Terminal::Cancelled;
            }
            if params.max_iterations >= 0 && iteration >= params.max_iterations as u32 {
                break Terminal::BudgetExhausted;
            }

            let phase = Phase::of_iteration(iteration, params.inner_iterations);
            let mask = self.builder.build(labels, phase);
            self.cache.reset();
            self.cache
                .rebuild(labels, self.image, &mask, &self.refiner.descriptor);
            let candidates: Vec<Idx2d> = mask.positions().collect();

            let mut changes = Vec::new();
            let mut cancelled = false;
            for _ in 0..params.max_sweeps {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let changed = self.sweep(labels, &candidates, phase);
                debug!("iteration {iteration} sweep {}: {changed} changed", changes.len());
                changes.push(changed);
                if changed == 0 {
                    break;
                }
            }
            info!(
                "iteration {iteration} ({phase:?}): {} candidates, sweeps {changes:?}",
                candidates.len()
            );

            let first_unchanged = changes.first() == Some(&0);
            sweeps.push(changes);
            if cancelled {
                break Terminal::Cancelled;
            }
            best.clone_from(labels);
            iteration += 1;
            if first_unchanged {
                break Terminal::Converged;
            }
        };

        if terminal == Terminal::Cancelled {
            labels.clone_from(&best);
        }
        let error = params
            .compute_error
            .then(|| self.error_summary(labels))
            .flatten();
        info!(
            "refinement finished: {terminal:?} after {iteration} iterations in {:?}, error {error:?}",
            start.elapsed()
        );

        Ok(RefineReport {
            terminal,
            iterations: iteration,
            sweeps,
            error,
        })
    }

    /// 一次扫描. 返回保留的翻转个数.
    fn sweep(&mut self, labels: &mut LabelImage, candidates: &[Idx2d], phase: Phase) -> usize {
        if candidates.is_empty() {
            return 0;
        }
        let n = candidates.len() * self.refiner.params.oversampling as usize;
        let samples: Vec<Idx2d> = (0..n)
            .map(|_| candidates[self.rng.gen_range(0..candidates.len())])
            .collect();

        let reference = labels.clone();
        let shape = labels.shape();
        let cells: Vec<AtomicU8> = labels.array_view().iter().map(|&v| AtomicU8::new(v)).collect();
        let lock = Mutex::new(());
        let changed = AtomicUsize::new(0);
        let (cache, energy, guard, roi) = (&self.cache, &self.energy, &self.guard, self.roi);

        let visit = |&pos: &Idx2d| {
            if !roi.map_or(true, |r| r.contains(pos)) {
                return;
            }
            let k = pos.0 * shape.1 + pos.1;
            let cur = cells[k].load(Ordering::Relaxed);
            if is_foreground(cur) && phase == Phase::Inner {
                let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
                let snapshot = N9.map(|d| {
                    shift(pos, d, shape).map_or(LABEL_BACKGROUND, |p| {
                        cells[p.0 * shape.1 + p.1].load(Ordering::Relaxed)
                    })
                });
                if would_disconnect(&snapshot, guard) {
                    return;
                }
            }
            let feat = cache.get(pos);
            let next = flipped(cur);
            let err1 = energy.energy(cur, feat, &reference, pos, phase);
            let err2 = energy.energy(next, feat, &reference, pos, phase);
            if err1 <= err2 {
                return;
            }
            cells[k].store(next, Ordering::Relaxed);
            changed.fetch_add(1, Ordering::Release);
        };

        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                samples.par_iter().for_each(visit);
            } else {
                samples.iter().for_each(visit);
            }
        }

        // `cells` 按 `iter()` 的逻辑顺序构造, 按同样顺序写回.
        for (v, cell) in labels.array_view_mut().iter_mut().zip(cells) {
            *v = cell.into_inner();
        }
        changed.load(Ordering::Acquire)
    }

    /// `|mean(erosion boundary) + mean(dilation boundary)|`, 两侧都无样本时为 `None`.
    fn error_summary(&mut self, labels: &LabelImage) -> Option<f32> {
        let (inner, outer) = self.builder.error_masks(labels);
        let a = self.mean_error(labels, &inner);
        let b = self.mean_error(labels, &outer);
        match (a, b) {
            (None, None) => None,
            (a, b) => Some((a.unwrap_or(0.0) + b.unwrap_or(0.0)).abs()),
        }
    }

    fn mean_error(&mut self, labels: &LabelImage, mask: &BinaryMask) -> Option<f32> {
        self.cache.reset();
        self.cache
            .rebuild(labels, self.image, mask, &self.refiner.descriptor);
        let (n, sum) = mask
            .positions()
            .filter(|&p| self.roi.map_or(true, |r| r.contains(p)))
            .filter_map(|p| self.energy.error(labels[p], self.cache.get(p), labels, p))
            .fold((0usize, 0.0f32), |(n, s), e| (n + 1, s + e));
        (n > 0).then(|| sum / n as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Bucket;
    use crate::consts::gray::LABEL_FOREGROUND;
    use crate::consts::CALIBRATION_BUCKETS;
    use crate::feature::Descriptors;
    use crate::morph::Connectivity;

    /// 所有表项缺失, 查询总是无效.
    fn empty_table() -> CalibrationTable {
        let b = Bucket {
            inner: vec![-1.0; 100],
            outer: vec![-1.0; 100],
        };
        CalibrationTable::from_buckets(vec![b; CALIBRATION_BUCKETS]).unwrap()
    }

    /// 处处 inner = 0.3, outer = 0.7.
    fn flat_table() -> CalibrationTable {
        let b = Bucket {
            inner: vec![0.3; 100],
            outer: vec![0.7; 100],
        };
        CalibrationTable::from_buckets(vec![b; CALIBRATION_BUCKETS]).unwrap()
    }

    fn block() -> (LabelImage, IntensityImage) {
        let labels = LabelImage::from_shape_fn((5, 5), |(h, w)| {
            if (1..4).contains(&h) && (1..4).contains(&w) {
                LABEL_FOREGROUND
            } else {
                0
            }
        });
        let image = IntensityImage::from_shape_fn((5, 5), |(h, w)| {
            if (1..4).contains(&h) && (1..4).contains(&w) {
                100.0
            } else {
                50.0
            }
        });
        (labels, image)
    }

    /// 斜率比直接取自强度图像 (`0..=1`), 宽度与动态范围为常数.
    struct IntensityAsRatio;

    impl BoundaryDescriptor for IntensityAsRatio {
        fn describe(&self, _: &LabelImage, pos: Idx2d, image: &IntensityImage) -> Option<Descriptors> {
            Some(Descriptors {
                width: 4.0,
                dyn_range: 40.0,
                ri: image[pos],
            })
        }
    }

    #[test]
    fn test_no_calibration_converges_unchanged() {
        let (mut labels, image) = block();
        let before = labels.clone();
        let table = empty_table();
        let params = RefineParams {
            max_iterations: 1,
            ..Default::default()
        };
        let report = refine_edges(&table, &image, &mut labels, None, params).unwrap();
        assert_eq!(labels, before);
        assert_eq!(report.terminal(), Terminal::Converged);
        assert_eq!(report.iterations(), 1);
        assert_eq!(report.sweeps(), &[vec![0]]);
        assert_eq!(report.changed_total(), 0);
        assert_eq!(report.error(), None);
    }

    #[test]
    fn test_fixed_point_converges_regardless_of_budget() {
        let (mut labels, image) = block();
        let before = labels.clone();
        let table = empty_table();
        let params = RefineParams {
            max_iterations: -1,
            compute_error: false,
            ..Default::default()
        };
        let r = EdgeRefiner::new(&table, IntensityAsRatio, params).unwrap();
        let report = r.run(&image, &mut labels, None, &CancelToken::new()).unwrap();
        assert_eq!(report.terminal(), Terminal::Converged);
        assert_eq!(report.iterations(), 1);
        assert_eq!(labels, before);
    }

    #[test]
    fn test_budget_and_cancel() {
        let (mut labels, image) = block();
        let table = empty_table();
        let params = RefineParams {
            max_iterations: 0,
            ..Default::default()
        };
        let report = refine_edges(&table, &image, &mut labels, None, params).unwrap();
        assert_eq!(report.terminal(), Terminal::BudgetExhausted);
        assert_eq!(report.iterations(), 0);

        let cancel = CancelToken::new();
        cancel.cancel();
        let r = EdgeRefiner::new(&table, IntensityAsRatio, RefineParams::default()).unwrap();
        let report = r.run(&image, &mut labels, None, &cancel).unwrap();
        assert_eq!(report.terminal(), Terminal::Cancelled);
        assert!(report.sweeps().is_empty());
    }

    #[test]
    fn test_shape_mismatch() {
        let (mut labels, _) = block();
        let image = IntensityImage::constant((4, 5), 0.0);
        let table = empty_table();
        let err = refine_edges(&table, &image, &mut labels, None, RefineParams::default()).unwrap_err();
        assert!(matches!(err, ConfigError::ShapeMismatch { .. }));
        let bad = RefineParams {
            oversampling: 0,
            ..Default::default()
        };
        assert!(EdgeRefiner::new(&table, IntensityAsRatio, bad).is_err());
    }

    /// 前景块内的一个像素斜率比很高 (像背景), 在腐蚀阶段应被翻转为背景;
    /// 块外紧邻的一个背景像素斜率比很低 (像血管), 在膨胀阶段应被翻转为前景.
    #[test]
    fn test_flips_follow_slope_ratio() {
        let table = flat_table();
        let labels0 = LabelImage::from_shape_fn((9, 9), |(h, w)| {
            if (2..7).contains(&h) && (2..7).contains(&w) {
                LABEL_FOREGROUND
            } else {
                0
            }
        });
        // 前景像素 0.1, 背景像素 0.9, 两个 "错标" 像素相反.
        let mut image = IntensityImage::from_shape_fn((9, 9), |p| if labels0.is_fg(p) { 0.1 } else { 0.9 });
        image[(2, 4)] = 1.0;
        image[(7, 4)] = 0.0;

        let params = RefineParams {
            neighbour_weight: 0.1,
            max_iterations: 2,
            oversampling: 16,
            compute_error: true,
            seed: 7,
            ..Default::default()
        };
        let r = EdgeRefiner::new(&table, IntensityAsRatio, params).unwrap();
        let mut labels = labels0.clone();
        let report = r.run(&image, &mut labels, None, &CancelToken::new()).unwrap();

        assert!(!labels.is_fg((2, 4)));
        assert!(labels.is_fg((7, 4)));
        assert_eq!(labels.diff(&labels0).count(), 2);
        assert_eq!(report.iterations(), 2);
        assert!(report.changed_total() >= 2);
        assert!(report.error().is_some());
    }

    /// 十字形 (7x7, 中心 `(3, 3)`, 四臂各一个像素), 中心强度 1.0, 其余 0.5.
    fn plus() -> (LabelImage, IntensityImage) {
        let labels = LabelImage::from_shape_fn((7, 7), |(h, w)| {
            if (h == 3 && (2..5).contains(&w)) || (w == 3 && (2..5).contains(&h)) {
                LABEL_FOREGROUND
            } else {
                0
            }
        });
        let image = IntensityImage::from_shape_fn((7, 7), |p| if p == (3, 3) { 1.0 } else { 0.5 });
        (labels, image)
    }

    /// 只对 `pos` 做一次扫描, 特征缓存覆盖整幅图像.
    fn sweep_at(
        labels: &mut LabelImage,
        image: &IntensityImage,
        pos: Idx2d,
        phase: Phase,
        connectivity: Connectivity,
    ) -> usize {
        let table = flat_table();
        let params = RefineParams {
            connectivity,
            ..Default::default()
        };
        let refiner = EdgeRefiner::new(&table, IntensityAsRatio, params).unwrap();
        let mut imp = RunImp {
            refiner: &refiner,
            image,
            roi: None,
            builder: BoundaryMaskBuilder::new(labels),
            energy: EdgeEnergy::new(&table, &refiner.params),
            guard: connectivity.table(),
            cache: FeatureCache::new(labels.shape()),
            rng: StdRng::seed_from_u64(0),
        };
        let everywhere = BinaryMask::full(labels.shape());
        imp.cache.rebuild(labels, image, &everywhere, &IntensityAsRatio);
        imp.sweep(labels, &[pos], phase)
    }

    #[test]
    fn test_guard_keeps_articulation_pixel() {
        // 能量倾向于清除十字中心, 但清除会把四臂分开.
        let (mut labels, image) = plus();
        let before = labels.clone();
        assert_eq!(sweep_at(&mut labels, &image, (3, 3), Phase::Inner, Connectivity::CornerGuarded), 0);
        assert_eq!(labels, before);

        // 历史 8-连通表认为四臂仍然连通, 不做保护.
        assert_eq!(sweep_at(&mut labels, &image, (3, 3), Phase::Inner, Connectivity::Legacy), 1);
        assert!(!labels.is_fg((3, 3)));
    }

    #[test]
    fn test_guard_skipped_outside_erosion() {
        // 膨胀阶段不检查连通性.
        let (mut labels, image) = plus();
        assert_eq!(sweep_at(&mut labels, &image, (3, 3), Phase::Outer, Connectivity::CornerGuarded), 1);
        assert!(!labels.is_fg((3, 3)));
        assert_eq!(labels.count_foreground(), 4);

        // 背景 -> 前景的翻转也不检查: 3x3 环的中心被填上.
        let mut ring = LabelImage::from_shape_fn((5, 5), |(h, w)| {
            if (1..4).contains(&h) && (1..4).contains(&w) && (h, w) != (2, 2) {
                LABEL_FOREGROUND
            } else {
                0
            }
        });
        let image = IntensityImage::from_shape_fn((5, 5), |p| if p == (2, 2) { 0.0 } else { 0.5 });
        assert_eq!(sweep_at(&mut ring, &image, (2, 2), Phase::Inner, Connectivity::CornerGuarded), 1);
        assert!(ring.is_fg((2, 2)));
    }

    #[test]
    fn test_roi_blocks_changes() {
        let table = flat_table();
        let labels0 = LabelImage::from_shape_fn((9, 9), |(h, w)| {
            if (2..7).contains(&h) && (2..7).contains(&w) {
                LABEL_FOREGROUND
            } else {
                0
            }
        });
        let mut image = IntensityImage::from_shape_fn((9, 9), |p| if labels0.is_fg(p) { 0.1 } else { 0.9 });
        image[(2, 4)] = 1.0;
        let roi = BinaryMask::zeros((9, 9));
        let params = RefineParams {
            neighbour_weight: 0.1,
            max_iterations: 2,
            ..Default::default()
        };
        let r = EdgeRefiner::new(&table, IntensityAsRatio, params).unwrap();
        let mut labels = labels0.clone();
        r.run(&image, &mut labels, Some(&roi), &CancelToken::new()).unwrap();
        assert_eq!(labels, labels0);
    }
}
