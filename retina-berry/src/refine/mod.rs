//! 二维标签精化: 边缘能量, 连通性保护, 候选掩膜与随机局部搜索优化器,
//! 以及基于滤波器响应的细小血管补全.

mod energy;
mod guard;
mod mask;
mod optimizer;
mod params;
mod thin_objects;

pub use energy::EdgeEnergy;
pub use guard::{component_count, split_counts, would_disconnect};
pub use mask::{BoundaryMaskBuilder, Phase};
pub use optimizer::{refine_edges, CancelToken, EdgeRefiner, RefineReport, Terminal};
pub use params::RefineParams;
pub use thin_objects::{add_thin_vessels, mean_filter_response, ThinObjectAddition, ThinObjectParams};
