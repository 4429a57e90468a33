//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, Offset2d, Offset3d};

pub use crate::{
    BinaryMask, Border3, BorderMode, ImgWriteRaw, ImgWriteVis, IntensityImage, LabelImage, Volume,
};

pub use crate::consts::gray::{
    LABEL_BACKGROUND, LABEL_FOREGROUND, VOXEL_BACKGROUND, VOXEL_CONFIRMED, VOXEL_FOREGROUND,
};
pub use crate::consts::ElemType;

pub use crate::calibration::{home_calibration_dir, CalibrationTable, DesiredSlopes};
pub use crate::error::{CacheError, CalibrationError, ConfigError};

pub use crate::feature::{
    BoundaryDescriptor, Descriptors, EqualSlopeDescriptor, FeatureCache, GaussianFeature,
    LineDetector, PixelFeature,
};
pub use crate::morph::{Connectivity, NeighborOffsetTable, StructElem2d};

pub use crate::refine::{
    add_thin_vessels, mean_filter_response, refine_edges, CancelToken, EdgeRefiner, RefineParams,
    RefineReport, Terminal, ThinObjectAddition, ThinObjectParams,
};

pub use crate::volume::{
    default_cache_dir, keep_anchored_regions, CleaningParams, CoherenceCriterion, CoherenceFilter,
    DirectionalSweep, LineBank, LineBankCache, LineBankParams, RegionCleaningPass, SweepAxis,
};
