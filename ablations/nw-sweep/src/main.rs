//! 邻域项权重 (`neighbour_weight`) 消融实验.
//!
//! 在合成的血管图像上, 以不同的邻域项权重并行运行边缘精化,
//! 并与真值比较; 随后在合成体数据上运行一次一致性滤波与方向性扫描清理.

mod phantom;
mod result;
mod runner;

fn main() {
    utils::init_logger();
    runner::run().analyze();
}
