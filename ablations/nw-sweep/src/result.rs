//! 实验结果.

use retina_berry::prelude::RefineReport;
use retina_berry::volume::CleaningReport;
use std::io::{self, Write};
use std::time::Duration;

/// 单个邻域项权重的结果.
pub struct SweepRow {
    pub nw: f32,
    pub elapsed: Duration,
    /// 精化前与真值不一致的像素数.
    pub before: usize,
    /// 精化后与真值不一致的像素数.
    pub after: usize,
    pub report: RefineReport,
}

/// 体数据部分的结果.
pub struct VolumeRow {
    pub lines: usize,
    pub foreground: usize,
    pub coherence_removed: usize,
    pub cleaning: CleaningReport,
    pub elapsed: Duration,
}

#[inline]
fn f32_to_display(f: Option<f32>) -> String {
    match f {
        Some(f) => format!("{f:.6}"),
        None => "/".to_string(),
    }
}

/// 将 `row` 的结果写进 `w` 中.
fn describe_into<W: Write>(row: &SweepRow, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";
    let r = &row.report;
    writeln!(w, "neighbour_weight = {:.2}:", row.nw)?;
    writeln!(w, "{S4}Terminal: {:?} after {} iterations", r.terminal(), r.iterations())?;
    writeln!(w, "{S4}Pixels flipped: {}", r.changed_total())?;
    writeln!(w, "{S4}Mean boundary error: {}", f32_to_display(r.error()))?;
    writeln!(w, "{S4}Disagreement with truth: {} -> {}", row.before, row.after)?;
    write!(w, "{S4}Time: {} us", row.elapsed.as_micros())?;
    Ok(())
}

fn describe_volume_into<W: Write>(row: &VolumeRow, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";
    writeln!(w, "Volume cleaning ({} lines):", row.lines)?;
    writeln!(w, "{S4}Foreground voxels: {}", row.foreground)?;
    writeln!(w, "{S4}Removed by coherence filter: {}", row.coherence_removed)?;
    writeln!(
        w,
        "{S4}Removed by sweeps: {} in {} rounds ({:?})",
        row.cleaning.changed_total(),
        row.cleaning.rounds().len(),
        row.cleaning.terminal()
    )?;
    write!(w, "{S4}Time: {} us", row.elapsed.as_micros())?;
    Ok(())
}

/// 消融实验最终结果.
pub struct AblationResult {
    rows: Vec<SweepRow>,
    volume: Option<VolumeRow>,
}

impl AblationResult {
    pub fn new(rows: Vec<SweepRow>, volume: Option<VolumeRow>) -> Self {
        Self { rows, volume }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for row in self.rows.iter() {
            describe_into(row, &mut buf).unwrap();
            println!("{}", String::from_utf8_lossy(&buf));
            buf.clear();
            utils::sep();
        }
        if let Some(v) = &self.volume {
            describe_volume_into(v, &mut buf).unwrap();
            println!("{}", String::from_utf8_lossy(&buf));
            utils::sep();
        }
        if let Some(best) = self.rows.iter().min_by_key(|r| r.after) {
            println!("Best neighbour_weight: {:.2} ({} pixels off)", best.nw, best.after);
        }
    }
}
