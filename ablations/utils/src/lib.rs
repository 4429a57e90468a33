//! 消融实验依赖的通用组件.

use log::LevelFilter;
use simple_logger::SimpleLogger;

pub mod loader;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 安装日志输出. 环境变量 `RUST_LOG` 可以覆盖默认的 `Info` 级别.
///
/// 重复安装时忽略.
pub fn init_logger() {
    let _ = SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init();
}
