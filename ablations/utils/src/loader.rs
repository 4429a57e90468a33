//! 对 `retina-berry` 默认路径的更一层封装. 提供标定表和线段组缓存的加载器.

use retina_berry::calibration::{home_calibration_dir, CalibrationTable};
use retina_berry::error::CalibrationResult;
use retina_berry::volume::{default_cache_dir, LineBankCache};
use std::env;
use std::path::{Path, PathBuf};

/// 获取标定文件目录.
///
/// 1. 若环境变量 `$RETINA_CALIBRATION_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/retina/calibration`.
pub fn calibration_dir_from_env_or_home() -> Option<PathBuf> {
    match env::var("RETINA_CALIBRATION_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => home_calibration_dir(),
    }
}

/// 从 `path` 读取标定表.
#[inline]
pub fn calibration_table<P: AsRef<Path>>(path: P) -> CalibrationResult<CalibrationTable> {
    CalibrationTable::open_dir(path)
}

/// 从 `$RETINA_CALIBRATION_DIR` 或者 `$HOME/dataset/retina/calibration` 读取标定表.
///
/// 目录不存在时返回 `None`.
pub fn calibration_table_from_env_or_home() -> Option<CalibrationResult<CalibrationTable>> {
    let dir = calibration_dir_from_env_or_home()?;
    dir.is_dir().then(|| calibration_table(dir))
}

/// 获取线段组缓存目录.
///
/// 1. 若环境变量 `$RETINA_LINE_CACHE_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `<cache dir>/retina-berry`.
pub fn line_cache_dir_from_env_or_default() -> Option<PathBuf> {
    match env::var("RETINA_LINE_CACHE_DIR") {
        Ok(d) if !d.is_empty() => Some(PathBuf::from(d)),
        _ => default_cache_dir(),
    }
}

/// 线段组缓存.
#[inline]
pub fn line_cache_from_env_or_default() -> Option<LineBankCache> {
    line_cache_dir_from_env_or_default().map(LineBankCache::new)
}
