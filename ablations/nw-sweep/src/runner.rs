//! 程序运行函数.

use crate::phantom::{disagreement, noisy_tube, VesselPhantom};
use crate::result::{AblationResult, SweepRow, VolumeRow};
use log::{info, warn};
use retina_berry::calibration::Bucket;
use retina_berry::consts::CALIBRATION_BUCKETS;
use retina_berry::prelude::*;
use std::thread;
use std::time::Instant;
use utils::loader;

/// 参与比较的邻域项权重.
const WEIGHTS: [f32; 6] = [0.0, 0.5, 1.0, 1.7, 2.5, 4.0];

/// 读取标定表. 没有标定目录时使用常数斜率的合成标定表.
fn calibration() -> CalibrationTable {
    match loader::calibration_table_from_env_or_home() {
        Some(Ok(table)) => return table,
        Some(Err(e)) => warn!("calibration table unavailable ({e}), using a synthetic one"),
        None => info!("no calibration directory, using a synthetic table"),
    }
    let bucket = Bucket {
        inner: vec![0.35; 100],
        outer: vec![0.65; 100],
    };
    CalibrationTable::from_buckets(vec![bucket; CALIBRATION_BUCKETS])
        .expect("synthetic calibration buckets are non-empty")
}

/// 单个权重下的一次运行.
fn refine_with(table: &CalibrationTable, phantom: &VesselPhantom, nw: f32) -> SweepRow {
    let params = RefineParams {
        neighbour_weight: nw,
        seed: 42,
        ..Default::default()
    };
    let refiner = EdgeRefiner::new(table, EqualSlopeDescriptor::default(), params)
        .expect("ablation parameters are valid");
    let mut labels = phantom.initial.clone();
    let start = Instant::now();
    let report = refiner
        .run(&phantom.image, &mut labels, None, &CancelToken::new())
        .expect("phantom image and labels share a shape");
    SweepRow {
        nw,
        elapsed: start.elapsed(),
        before: disagreement(&phantom.initial, &phantom.truth),
        after: disagreement(&labels, &phantom.truth),
        report,
    }
}

/// 体数据部分: 一致性滤波 + 方向性扫描清理.
fn volume_stage() -> Option<VolumeRow> {
    let volume = noisy_tube(24);
    let params = LineBankParams {
        length: 6.0,
        ..Default::default()
    };
    let cache = loader::line_cache_from_env_or_default();
    let filter = match CoherenceFilter::build(&params, CoherenceCriterion::AnyLine { threshold: 0.8 }, cache.as_ref()) {
        Ok(f) => f,
        Err(e) => {
            warn!("coherence filter unavailable: {e}");
            return None;
        }
    };
    let start = Instant::now();
    let filtered = filter.apply(&volume, None, None).ok()?;
    let mut cleaned = filtered.output;
    let report = RegionCleaningPass::new(CleaningParams::default())
        .ok()?
        .run(&mut cleaned, None, None, &CancelToken::new())
        .ok()?;
    Some(VolumeRow {
        lines: filter.bank().len(),
        foreground: volume.count_foreground(),
        coherence_removed: filtered.removed,
        cleaning: report,
        elapsed: start.elapsed(),
    })
}

/// 实际运行.
pub fn run() -> AblationResult {
    let table = calibration();
    let phantom = VesselPhantom::new();
    info!("running {} refinements on {} cpus", WEIGHTS.len(), utils::cpus());

    let rows = thread::scope(|s| {
        let handles = WEIGHTS.map(|nw| {
            let (table, phantom) = (&table, &phantom);
            s.spawn(move || refine_with(table, phantom, nw))
        });
        handles
            .into_iter()
            .map(|th| th.join().expect("Thread joining error"))
            .collect::<Vec<_>>()
    });
    AblationResult::new(rows, volume_stage())
}
