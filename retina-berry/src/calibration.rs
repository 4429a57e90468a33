//! 标定表: 按 (边界宽度, 动态范围) 查询期望的内/外边缘斜率.
//!
//! 标定数据来自 `relative-intensities-<bucket>.txt` 文件, 每个文件对应一个
//! 动态范围桶 (`1..=69`), 内容依次为: 整数 `N`, `N` 个浮点数 (内侧斜率),
//! 整数 `M`, `M` 个浮点数 (外侧斜率). `-1` 表示缺失.

use crate::consts::{CALIBRATION_BUCKETS, SUMMARY_ROWS, TABLE_THRESHOLD, UPPER_DYN, UPPER_WIDTH};
use crate::error::{CalibrationError, CalibrationResult};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 缺失值标记.
const MISSING: f32 = -1.0;

/// 期望的内/外边缘斜率.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DesiredSlopes {
    /// 前景一侧的期望斜率.
    pub inner: f32,

    /// 背景一侧的期望斜率.
    pub outer: f32,
}

/// 一个动态范围桶的原始数据, `-1` 表示缺失.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bucket {
    /// 内侧斜率, 按宽度索引.
    pub inner: Vec<f32>,

    /// 外侧斜率, 按宽度索引.
    pub outer: Vec<f32>,
}

/// 只读标定表. 构造后不可变, 可在线程间共享.
#[derive(Clone, Debug)]
pub struct CalibrationTable {
    inner: Vec<Vec<Option<f32>>>,
    outer: Vec<Vec<Option<f32>>>,
    inner_sum: Vec<Option<f32>>,
    outer_sum: Vec<Option<f32>>,
    table_th: f32,
}

/// 获取 `$HOME/dataset/retina/calibration`.
pub fn home_calibration_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.extend(["dataset", "retina", "calibration"]);
    Some(ans)
}

/// 第 `bucket` 个标定文件的文件名.
#[inline]
pub fn bucket_file_name(bucket: usize) -> String {
    format!("relative-intensities-{bucket}.txt")
}

impl CalibrationTable {
    /// 从目录 `dir` 读取 `relative-intensities-1.txt` 至
    /// `relative-intensities-69.txt`.
    ///
    /// 任一文件缺失或格式错误时返回 `Err`.
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> CalibrationResult<Self> {
        let dir = dir.as_ref();
        let buckets = (1..=CALIBRATION_BUCKETS)
            .map(|b| {
                let path = dir.join(bucket_file_name(b));
                let text = fs::read_to_string(&path).map_err(|source| {
                    CalibrationError::MissingBucket {
                        bucket: b,
                        path: path.clone(),
                        source,
                    }
                })?;
                parse_bucket(b, &text)
            })
            .collect::<CalibrationResult<Vec<_>>>()?;
        info!("loaded {} calibration buckets from {:?}", buckets.len(), dir);
        Self::from_buckets(buckets)
    }

    /// 由内存中的桶数据构造. `buckets[0]` 对应桶 1.
    ///
    /// 构造过程:
    ///
    /// 1. 第 0 行复制桶 1;
    /// 2. 对每一行执行历史遗留的尾部回填 (见 `backfill`);
    /// 3. 最后 `SUMMARY_ROWS` 行按宽度求平均 (只统计非负的有效值), 得到汇总行.
    pub fn from_buckets(buckets: Vec<Bucket>) -> CalibrationResult<Self> {
        let first = buckets.first().ok_or(CalibrationError::NoBuckets)?.clone();
        let rows = std::iter::once(first).chain(buckets);

        let (mut inner, mut outer): (Vec<Vec<f32>>, Vec<Vec<f32>>) =
            rows.map(|b| (b.inner, b.outer)).unzip();
        inner.iter_mut().for_each(|r| backfill(r));
        outer.iter_mut().for_each(|r| backfill(r));

        let inner_sum = summary_row(&inner);
        let outer_sum = summary_row(&outer);
        debug!(
            "calibration table: {} rows, summary widths {}/{}",
            inner.len(),
            inner_sum.len(),
            outer_sum.len()
        );

        Ok(Self {
            inner: inner.into_iter().map(to_options).collect(),
            outer: outer.into_iter().map(to_options).collect(),
            inner_sum,
            outer_sum,
            table_th: TABLE_THRESHOLD,
        })
    }

    /// 修改 "宽度超界时仍按列插值" 的动态范围门限. 默认为 `TABLE_THRESHOLD`.
    #[inline]
    pub fn with_table_threshold(mut self, th: f32) -> Self {
        self.table_th = th;
        self
    }

    /// 行数, 即最大桶编号 + 1.
    #[inline]
    pub fn rows(&self) -> usize {
        self.inner.len()
    }

    /// 查询 `(width, dyn)` 处的期望斜率. 任一所需表项缺失时返回 `None`.
    ///
    /// 该函数是纯函数, 相同输入总是得到逐位相同的结果.
    pub fn desired_slopes(&self, width: f32, dyn_range: f32) -> Option<DesiredSlopes> {
        let inner = self.lookup(&self.inner, &self.inner_sum, width, dyn_range)?;
        let outer = self.lookup(&self.outer, &self.outer_sum, width, dyn_range)?;
        Some(DesiredSlopes { inner, outer })
    }

    fn lookup(&self, rows: &[Vec<Option<f32>>], sum: &[Option<f32>], w: f32, d: f32) -> Option<f32> {
        if !(w >= 0.0 && d >= 0.0) {
            return None;
        }
        let last = rows.len() - 1;
        let at = |r: usize, c: usize| rows.get(r)?.get(c).copied().flatten();
        let sum_at = |c: usize| sum.get(c).copied().flatten();
        let (wa, wb, ia, ib) = weights(w);
        let (wc, wd, ic, id) = weights(d);
        let upper_w = UPPER_WIDTH as f32;
        let upper_d = UPPER_DYN as f32;

        if w < upper_w {
            if d < last as f32 {
                if d < upper_d {
                    let ca = wa * at(ic, ia)? + wb * at(ic, ib)?;
                    let cb = wa * at(id, ia)? + wb * at(id, ib)?;
                    Some(wc * ca + wd * cb)
                } else {
                    Some(wa * sum_at(ia)? + wb * sum_at(ib)?)
                }
            } else if d < upper_d {
                Some(wa * at(last, ia)? + wb * at(last, ib)?)
            } else {
                Some(wa * sum_at(ia)? + wb * sum_at(ib)?)
            }
        } else {
            let col = UPPER_WIDTH - 1;
            if d < last as f32 {
                if d < self.table_th {
                    Some(wc * at(ic, col)? + wd * at(id, col)?)
                } else {
                    sum.last().copied().flatten()
                }
            } else if d < upper_d {
                at(last, col)
            } else {
                sum.last().copied().flatten()
            }
        }
    }
}

/// 线性插值权重: `(w_ceil, w_floor, ceil, floor)`. 整数输入时为 `(1, 0, x, x)`.
#[inline]
fn weights(x: f32) -> (f32, f32, usize, usize) {
    let a = x.ceil();
    let b = x.floor();
    if a == b {
        (1.0, 0.0, a as usize, b as usize)
    } else {
        (x - b, a - x, a as usize, b as usize)
    }
}

/// 历史遗留的尾部回填: 从后向前找到最后一个有效值的下标 `j`,
/// 然后把 `j..len` 全部改写为 `row[j - 2]`.
///
/// 注意这里使用的是 `j - 2` 而不是 `j`, 与既有标定数据的生成方式保持一致.
/// `j < 2` 的行保持不变.
fn backfill(row: &mut [f32]) {
    let Some(j) = row.iter().rposition(|&v| v != MISSING) else {
        return;
    };
    if j < 2 {
        return;
    }
    let fill = row[j - 2];
    row[j..].iter_mut().for_each(|v| *v = fill);
}

/// 最后 `SUMMARY_ROWS` 行按列平均, 只统计非负值. 无有效值的列为 `None`.
fn summary_row(rows: &[Vec<f32>]) -> Vec<Option<f32>> {
    let tail = &rows[rows.len().saturating_sub(SUMMARY_ROWS)..];
    let width = tail.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|c| {
            let (n, s) = tail
                .iter()
                .filter_map(|r| r.get(c).copied())
                .filter(|&v| v >= 0.0)
                .fold((0usize, 0.0f32), |(n, s), v| (n + 1, s + v));
            (n > 0).then(|| s / n as f32)
        })
        .collect()
}

#[inline]
fn to_options(row: Vec<f32>) -> Vec<Option<f32>> {
    row.into_iter()
        .map(|v| (v != MISSING).then_some(v))
        .collect()
}

/// 解析一个标定文件.
fn parse_bucket(bucket: usize, text: &str) -> CalibrationResult<Bucket> {
    let malformed = |reason: String| CalibrationError::Malformed { bucket, reason };
    let mut tokens = text.split_whitespace();
    let mut read_array = |what: &str| -> CalibrationResult<Vec<f32>> {
        let n: usize = tokens
            .next()
            .ok_or_else(|| malformed(format!("missing {what} count")))?
            .parse()
            .map_err(|e| malformed(format!("bad {what} count: {e}")))?;
        (0..n)
            .map(|i| {
                tokens
                    .next()
                    .ok_or_else(|| malformed(format!("{what} truncated at {i}/{n}")))?
                    .parse::<f32>()
                    .map_err(|e| malformed(format!("bad {what} value #{i}: {e}")))
            })
            .collect()
    };
    let inner = read_array("inner")?;
    let outer = read_array("outer")?;
    Ok(Bucket { inner, outer })
}
