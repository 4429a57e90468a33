//! 二维形态学原语: 结构元, 腐蚀/膨胀, 细化与连通区域提取.

mod binary;
mod offsets;
mod regions;
mod thin;

pub use binary::{dilate, dilate_mask, erode};
pub use offsets::{Connectivity, NeighborOffsetTable, StructElem2d};
pub use regions::{farthest_distance, regions8};
pub use thin::{endpoints, skeleton_exclusion, thin};
