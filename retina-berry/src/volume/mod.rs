//! 三维体数据区域清理: 线段一致性滤波, 方向性扫描, 锚定区域与连通分量.
//!
//! `keep` 与 `roi` 都以 `Volume<u8>` 表示, 非 0 即为集合内.

mod anchored;
mod coherence;
mod components;
mod line;
mod sweep;

pub use anchored::keep_anchored_regions;
pub use coherence::{CoherenceCriterion, CoherenceFilter, FilterOutcome};
pub use components::{components6, filter_components_by_size, keep_largest_component};
pub use line::{LineBank, LineBankCache, LineBankKind, LineBankParams, OrientedLine};
pub use sweep::{
    CleaningParams, CleaningReport, DirectionalSweep, RegionCleaningPass, SweepAxis, SweepOutcome,
};

use crate::error::{ConfigError, ConfigResult};
use crate::{Idx3d, Volume};
use std::path::PathBuf;

/// 线段组缓存的默认目录 `<cache dir>/retina-berry`. 平台没有缓存目录时返回 `None`.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("retina-berry"))
}

#[inline]
pub(crate) fn check_volume(expected: Idx3d, found: Idx3d) -> ConfigResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(ConfigError::VolumeShapeMismatch {
            expected: [expected.0, expected.1, expected.2],
            found: [found.0, found.1, found.2],
        })
    }
}

/// 掩膜体数据在 `pos` 处是否非 0.
#[inline]
pub(crate) fn is_set(mask: &Volume<u8>, pos: Idx3d) -> bool {
    mask[pos] != 0
}
