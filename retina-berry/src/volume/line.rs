//! 三维线段结构元, 线段组与其文本缓存.

use super::default_cache_dir;
use crate::error::{CacheError, CacheResult, ConfigError, ConfigResult};
use crate::Offset3d;
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 生成线段时的采样步数.
const LINE_STEPS: usize = 2000;

/// 两条线段的方向桶编号之差小于该值时才可能被合并.
const MERGE_ALPHA_DISTANCE: usize = 20;

/// 离散化的有向三维线段.
///
/// 偏移 `(dz, dh, dw)` 由中心体素 `(0, 0, 0)` 开始, 按到中心的距离排列, 不含重复.
#[derive(Clone, Debug, PartialEq)]
pub struct OrientedLine {
    offsets: Vec<Offset3d>,
    alpha_bin: usize,
    beta: f32,
    length: f32,
    covered: Vec<usize>,
}

impl OrientedLine {
    /// 长度 `length` (可为负, 表示反方向), 方位角 `alpha` 与极角 `beta` (弧度).
    ///
    /// 方向向量为 `(cos b, sin b sin a, sin b cos a)`, 即 `beta = 0` 沿切片法向.
    /// `length` 向零取整.
    pub fn generate(length: f32, alpha: f32, beta: f32) -> Vec<Offset3d> {
        let r = length.trunc();
        let (sa, ca) = alpha.sin_cos();
        let (sb, cb) = beta.sin_cos();
        let dir = (r * cb, r * sb * sa, r * sb * ca);
        let mut offsets: Vec<Offset3d> = Vec::new();
        for i in 0..LINE_STEPS {
            let t = i as f32 / LINE_STEPS as f32;
            let p = (
                (dir.0 * t).trunc() as isize,
                (dir.1 * t).trunc() as isize,
                (dir.2 * t).trunc() as isize,
            );
            if offsets.last() != Some(&p) {
                offsets.push(p);
            }
        }
        offsets
    }

    /// 偏移序列.
    #[inline]
    pub fn offsets(&self) -> &[Offset3d] {
        &self.offsets
    }

    /// 体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// 方向桶编号.
    #[inline]
    pub fn alpha_bin(&self) -> usize {
        self.alpha_bin
    }

    /// 极角 (弧度).
    #[inline]
    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// 带符号长度.
    #[inline]
    pub fn length(&self) -> f32 {
        self.length
    }

    /// 该线段 (包括被它合并的线段) 覆盖的方向桶, 升序.
    #[inline]
    pub fn covered(&self) -> &[usize] {
        &self.covered
    }
}

/// 线段组的角度网格与长度. 角度以度为单位, 网格两端都包含.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LineBankParams {
    /// 方位角起点.
    pub alpha0: f32,
    /// 方位角步长.
    pub alpha_step: f32,
    /// 方位角终点.
    pub alpha1: f32,
    /// 极角起点.
    pub beta0: f32,
    /// 极角步长.
    pub beta_step: f32,
    /// 极角终点.
    pub beta1: f32,
    /// 线段长度 (体素).
    pub length: f32,
}

impl Default for LineBankParams {
    fn default() -> Self {
        Self {
            alpha0: 0.0,
            alpha_step: 10.0,
            alpha1: 350.0,
            beta0: 0.0,
            beta_step: 15.0,
            beta1: 45.0,
            length: 10.0,
        }
    }
}

impl LineBankParams {
    /// 检查参数合法性.
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = |name: &'static str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: "must be finite and positive",
                })
            }
        };
        positive("alpha_step", self.alpha_step)?;
        positive("beta_step", self.beta_step)?;
        if self.length < 1.0 || !self.length.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "length",
                reason: "must be at least 1",
            });
        }
        if !(self.alpha0 <= self.alpha1 && self.beta0 <= self.beta1) {
            return Err(ConfigError::InvalidParameter {
                name: "alpha0",
                reason: "grid start must not exceed grid end",
            });
        }
        Ok(())
    }

    fn alphas(&self) -> impl Iterator<Item = f32> + '_ {
        grid(self.alpha0, self.alpha_step, self.alpha1)
    }

    fn betas(&self) -> impl Iterator<Item = f32> + '_ {
        grid(self.beta0, self.beta_step, self.beta1)
    }

    /// 方位角网格跨越的步数 (不含终点), 用于计算反方向的桶编号.
    fn total_alphas(&self) -> usize {
        (((self.alpha1 - self.alpha0) / self.alpha_step) as usize).max(1)
    }
}

/// `start..=end`, 以下标计算.
fn grid(start: f32, step: f32, end: f32) -> impl Iterator<Item = f32> {
    let n = ((end - start) / step + 1e-4).floor() as usize + 1;
    (0..n).map(move |k| start + k as f32 * step)
}

/// 线段组的构造方式.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LineBankKind {
    /// 每个 `(alpha, beta)` 生成 `+length`, `-length` 两条线段, 偏移相同者合并.
    Unique,

    /// 同 `Unique`, 但长度从 `length` 以 `length / 10` 递减到 1,
    /// 用于双侧判据.
    Stepped,

    /// 同 `Unique`, 但合并规则为: 体素数相同, 方向桶之差小于 20, 偏移相同.
    /// 被合并线段的方向桶记入保留线段的 `covered`.
    Coverage,
}

impl LineBankKind {
    fn name(self) -> &'static str {
        match self {
            LineBankKind::Unique => "unique",
            LineBankKind::Stepped => "stepped",
            LineBankKind::Coverage => "coverage",
        }
    }
}

/// 去重后的线段组.
#[derive(Clone, Debug, PartialEq)]
pub struct LineBank {
    lines: Vec<OrientedLine>,
    num_alphas: usize,
    original: usize,
    length: f32,
}

impl LineBank {
    /// 按 `kind` 构造.
    pub fn build(kind: LineBankKind, params: &LineBankParams) -> ConfigResult<Self> {
        params.validate()?;
        let bank = match kind {
            LineBankKind::Unique => Self::unique(params),
            LineBankKind::Stepped => Self::stepped(params),
            LineBankKind::Coverage => Self::coverage(params),
        };
        info!(
            "line bank ({}): {} lines reduced to {}",
            kind.name(),
            bank.original,
            bank.lines.len()
        );
        Ok(bank)
    }

    /// `LineBankKind::Unique`.
    pub fn unique(params: &LineBankParams) -> Self {
        let (lines, num_alphas) = Self::raw_lines(params, &[params.length]);
        Self::dedup_identical(lines, num_alphas, params.length)
    }

    /// `LineBankKind::Stepped`.
    pub fn stepped(params: &LineBankParams) -> Self {
        let l0 = params.length.trunc() as usize;
        let step = (l0 / 10).max(1);
        let lengths: Vec<f32> = (1..=l0).rev().step_by(step).map(|l| l as f32).collect();
        let (lines, num_alphas) = Self::raw_lines(params, &lengths);
        Self::dedup_identical(lines, num_alphas, params.length)
    }

    /// `LineBankKind::Coverage`.
    pub fn coverage(params: &LineBankParams) -> Self {
        let (mut lines, num_alphas) = Self::raw_lines(params, &[params.length]);
        let original = lines.len();
        let mut i = 0;
        while i < lines.len() {
            let mut j = i + 1;
            while j < lines.len() {
                let (a, b) = (&lines[i], &lines[j]);
                if a.len() == b.len()
                    && a.alpha_bin.abs_diff(b.alpha_bin) < MERGE_ALPHA_DISTANCE
                    && a.offsets == b.offsets
                {
                    let merged = lines.remove(j);
                    lines[i].covered.push(merged.alpha_bin);
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
        for line in lines.iter_mut() {
            line.covered.sort_unstable();
            line.covered.dedup();
        }
        Self {
            lines,
            num_alphas,
            original,
            length: params.length,
        }
    }

    /// 对每个 `(alpha, beta)` 与每个长度 `l` 生成 `+l`, `-l` 两条线段.
    fn raw_lines(params: &LineBankParams, lengths: &[f32]) -> (Vec<OrientedLine>, usize) {
        let total = params.total_alphas();
        let mut lines = Vec::new();
        let mut num_alphas = 0;
        for &l in lengths {
            num_alphas = 0;
            for a in params.alphas() {
                let opposite = (num_alphas + total / 2) % total;
                for b in params.betas() {
                    let (ar, br) = (a.to_radians(), b.to_radians());
                    for (len, bin) in [(l, num_alphas), (-l, opposite)] {
                        lines.push(OrientedLine {
                            offsets: OrientedLine::generate(len, ar, br),
                            alpha_bin: bin,
                            beta: br,
                            length: len,
                            covered: vec![bin],
                        });
                    }
                }
                num_alphas += 1;
            }
        }
        (lines, num_alphas)
    }

    /// 合并偏移完全相同的线段, 保留第一次出现的.
    fn dedup_identical(lines: Vec<OrientedLine>, num_alphas: usize, length: f32) -> Self {
        let original = lines.len();
        let mut seen: HashSet<Vec<Offset3d>> = HashSet::with_capacity(original);
        let lines = lines
            .into_iter()
            .filter(|l| seen.insert(l.offsets.clone()))
            .collect();
        Self {
            lines,
            num_alphas,
            original,
            length,
        }
    }

    /// 所有线段.
    #[inline]
    pub fn lines(&self) -> &[OrientedLine] {
        &self.lines
    }

    /// 去重后的线段数.
    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 方位角网格的点数, 即方向桶个数.
    #[inline]
    pub fn num_alphas(&self) -> usize {
        self.num_alphas
    }

    /// 去重前的线段数.
    #[inline]
    pub fn original_count(&self) -> usize {
        self.original
    }

    /// 去重后的线段数.
    #[inline]
    pub fn reduced_count(&self) -> usize {
        self.lines.len()
    }

    /// 构造时的线段长度.
    #[inline]
    pub fn length(&self) -> f32 {
        self.length
    }

    /// 序列化为文本缓存格式.
    pub fn to_cache_string(&self) -> String {
        let n = self.lines.len();
        let mut rows = vec![
            self.num_alphas.to_string(),
            self.original.to_string(),
            n.to_string(),
            format!("{:.6}", self.length),
            n.to_string(),
            self.lines.iter().map(|l| l.alpha_bin).join(" "),
            n.to_string(),
            self.lines.iter().map(|l| format!("{:.6}", l.beta)).join(" "),
            n.to_string(),
            self.lines.iter().map(|l| format!("{:.6}", l.length)).join(" "),
            n.to_string(),
        ];
        for l in &self.lines {
            rows.push(l.covered.len().to_string());
            rows.push(l.covered.iter().join(" "));
        }
        rows.push(n.to_string());
        for l in &self.lines {
            rows.push(l.offsets.len().to_string());
            rows.push(l.offsets.iter().map(|(z, h, w)| format!("{z} {h} {w}")).join(" "));
        }
        let mut s = rows.join("\n");
        s.push('\n');
        s
    }

    /// 解析文本缓存.
    pub fn from_cache_str(text: &str) -> CacheResult<Self> {
        let mut tokens = Tokens(text.split_whitespace());
        let num_alphas: usize = tokens.next("num_alphas")?;
        let original: usize = tokens.next("original count")?;
        let reduced: usize = tokens.next("reduced count")?;
        let length: f32 = tokens.next("length")?;

        let alpha_bins: Vec<usize> = tokens.counted("alpha bins", reduced)?;
        let betas: Vec<f32> = tokens.counted("betas", reduced)?;
        let lengths: Vec<f32> = tokens.counted("lengths", reduced)?;

        tokens.expect_count("covered", reduced)?;
        let mut covered = Vec::with_capacity(reduced);
        for _ in 0..reduced {
            let m: usize = tokens.next("covered size")?;
            let c = (0..m)
                .map(|_| tokens.next::<usize>("covered bin"))
                .collect::<CacheResult<Vec<_>>>()?;
            if c.iter().any(|&b| b >= num_alphas.max(1)) {
                return Err(CacheError::Malformed("covered bin out of range".into()));
            }
            covered.push(c);
        }

        tokens.expect_count("lines", reduced)?;
        let mut lines = Vec::with_capacity(reduced);
        for (k, covered) in covered.into_iter().enumerate() {
            let size: usize = tokens.next("line size")?;
            let offsets = (0..size)
                .map(|_| Ok((tokens.next("dz")?, tokens.next("dh")?, tokens.next("dw")?)))
                .collect::<CacheResult<Vec<Offset3d>>>()?;
            lines.push(OrientedLine {
                offsets,
                alpha_bin: alpha_bins[k],
                beta: betas[k],
                length: lengths[k],
                covered,
            });
        }
        if tokens.0.next().is_some() {
            return Err(CacheError::Malformed("trailing data".into()));
        }
        Ok(Self {
            lines,
            num_alphas,
            original,
            length,
        })
    }
}

/// 空白分隔的记号流.
struct Tokens<I>(I);

impl<'a, I: Iterator<Item = &'a str>> Tokens<I> {
    fn next<T: std::str::FromStr>(&mut self, what: &str) -> CacheResult<T> {
        let tok = self
            .0
            .next()
            .ok_or_else(|| CacheError::Malformed(format!("unexpected end of file reading {what}")))?;
        tok.parse()
            .map_err(|_| CacheError::Malformed(format!("bad {what}: {tok:?}")))
    }

    fn expect_count(&mut self, what: &str, expected: usize) -> CacheResult<()> {
        let n: usize = self.next(what)?;
        if n == expected {
            Ok(())
        } else {
            Err(CacheError::Malformed(format!("{what}: expected {expected} entries, found {n}")))
        }
    }

    fn counted<T: std::str::FromStr>(&mut self, what: &str, expected: usize) -> CacheResult<Vec<T>> {
        self.expect_count(what, expected)?;
        (0..expected).map(|_| self.next(what)).collect()
    }
}

/// 线段组的磁盘缓存. 每组参数对应目录下的一个 `.cache` 文本文件.
#[derive(Clone, Debug)]
pub struct LineBankCache {
    dir: PathBuf,
}

impl LineBankCache {
    /// 使用目录 `dir`. 目录不存在时在第一次写入时创建.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// 使用默认缓存目录 `<cache dir>/retina-berry`.
    pub fn default_location() -> Option<Self> {
        default_cache_dir().map(Self::new)
    }

    /// 缓存目录.
    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<kind>_<a0>_<astep>_<a1>_<b0>_<bstep>_<b1>_<len>.cache`.
    pub fn file_name(kind: LineBankKind, p: &LineBankParams) -> String {
        format!(
            "{}_{:.6}_{:.6}_{:.6}_{:.6}_{:.6}_{:.6}_{:.6}.cache",
            kind.name(),
            p.alpha0,
            p.alpha_step,
            p.alpha1,
            p.beta0,
            p.beta_step,
            p.beta1,
            p.length
        )
    }

    /// 读取缓存; 缓存不存在或损坏时重新构造并写回.
    ///
    /// 损坏的缓存只记录警告, 不作为错误返回. 只有写回失败才返回 `Err`.
    pub fn load_or_build(&self, kind: LineBankKind, params: &LineBankParams) -> CacheResult<LineBank> {
        params
            .validate()
            .map_err(|e| CacheError::Malformed(e.to_string()))?;
        let path = self.dir.join(Self::file_name(kind, params));
        match fs::read_to_string(&path) {
            Ok(text) => match LineBank::from_cache_str(&text) {
                Ok(bank) => {
                    info!("line bank loaded from {path:?}: {} lines", bank.len());
                    return Ok(bank);
                }
                Err(e) => warn!("rebuilding line bank, cache {path:?} is malformed: {e}"),
            },
            Err(e) => debug!("no line bank cache at {path:?}: {e}"),
        }
        let bank = LineBank::build(kind, params).map_err(|e| CacheError::Malformed(e.to_string()))?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, bank.to_cache_string())?;
        info!("line bank written to {path:?}");
        Ok(bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LineBankParams {
        LineBankParams {
            alpha0: 0.0,
            alpha_step: 45.0,
            alpha1: 315.0,
            beta0: 0.0,
            beta_step: 45.0,
            beta1: 90.0,
            length: 4.0,
        }
    }

    #[test]
    fn test_generate() {
        // 沿切片法向.
        let l = OrientedLine::generate(4.0, 0.0, 0.0);
        assert_eq!(l, vec![(0, 0, 0), (1, 0, 0), (2, 0, 0), (3, 0, 0)]);
        let l = OrientedLine::generate(-3.0, 0.0, 0.0);
        assert_eq!(l, vec![(0, 0, 0), (-1, 0, 0), (-2, 0, 0)]);
        // 切片内沿 w 方向.
        let l = OrientedLine::generate(3.0, 0.0, std::f32::consts::FRAC_PI_2);
        assert_eq!(l.last(), Some(&(0, 0, 2)));
        assert!(l.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn test_grid_inclusive() {
        assert_eq!(grid(0.0, 45.0, 315.0).count(), 8);
        assert_eq!(grid(0.0, 45.0, 90.0).count(), 3);
        assert_eq!(grid(5.0, 1.0, 5.0).count(), 1);
    }

    #[test]
    fn test_unique_merges_identical() {
        let p = params();
        let bank = LineBank::unique(&p);
        assert_eq!(bank.num_alphas(), 8);
        assert_eq!(bank.original_count(), 8 * 3 * 2);
        // beta = 0 的 8 个方位角给出同一对线段.
        assert!(bank.len() < bank.original_count());
        let offsets: HashSet<&[Offset3d]> = bank.lines().iter().map(|l| l.offsets()).collect();
        assert_eq!(offsets.len(), bank.len());
        assert_eq!(bank.lines()[0].offsets(), OrientedLine::generate(4.0, 0.0, 0.0).as_slice());
    }

    #[test]
    fn test_coverage_records_merged_bins() {
        let p = params();
        let bank = LineBank::coverage(&p);
        let first = &bank.lines()[0];
        // 沿法向的 +4 线段吸收了所有同向线段.
        assert_eq!(first.offsets(), OrientedLine::generate(4.0, 0.0, 0.0).as_slice());
        assert_eq!(first.covered(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(bank.reduced_count() < bank.original_count());
        for l in bank.lines() {
            assert!(l.covered().windows(2).all(|w| w[0] < w[1]));
            assert!(l.covered().contains(&l.alpha_bin()));
        }
    }

    #[test]
    fn test_stepped_lengths() {
        let p = LineBankParams {
            length: 20.0,
            ..params()
        };
        let bank = LineBank::stepped(&p);
        let mut lengths: Vec<i32> = bank.lines().iter().map(|l| l.length() as i32).collect();
        lengths.sort_unstable();
        lengths.dedup();
        assert_eq!(lengths, vec![-20, -18, -16, -14, -12, -10, -8, -6, -4, -2, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20]);
    }

    #[test]
    fn test_cache_text_and_file() {
        let p = params();
        let bank = LineBank::coverage(&p);
        let back = LineBank::from_cache_str(&bank.to_cache_string()).unwrap();
        assert_eq!(back.len(), bank.len());
        assert_eq!(back.original_count(), bank.original_count());
        assert_eq!(back.lines()[3].offsets(), bank.lines()[3].offsets());
        assert_eq!(back.lines()[0].covered(), bank.lines()[0].covered());
        assert!(LineBank::from_cache_str("3 4").is_err());

        let dir = std::env::temp_dir().join(format!("retina-berry-lines-{}", std::process::id()));
        let cache = LineBankCache::new(&dir);
        let name = LineBankCache::file_name(LineBankKind::Coverage, &p);
        assert_eq!(
            name,
            "coverage_0.000000_45.000000_315.000000_0.000000_45.000000_90.000000_4.000000.cache"
        );
        let built = cache.load_or_build(LineBankKind::Coverage, &p).unwrap();
        assert!(dir.join(&name).exists());
        let loaded = cache.load_or_build(LineBankKind::Coverage, &p).unwrap();
        assert_eq!(loaded.len(), built.len());

        // 损坏的缓存被重新构造.
        fs::write(dir.join(&name), "garbage").unwrap();
        let rebuilt = cache.load_or_build(LineBankKind::Coverage, &p).unwrap();
        assert_eq!(rebuilt.len(), built.len());
        fs::remove_dir_all(&dir).unwrap();
    }
}
