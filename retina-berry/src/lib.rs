#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 提供视网膜血管分割标签的能量优化精化 (refine), 以及三维体数据
//! 的切片级区域清理算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 二维标签图像仅允许 `0` (背景) 和 `255` (前景) 两种像素值;
//!   三维体数据标签仅允许 `0` 和 `1`. 扫描过程中临时使用 `2` 表示 "已确认".
//! 2. 构造阶段的错误 (标定文件缺失, 图像形状不符等) 以 `Result` 返回;
//!   运行阶段的单像素数值退化 (标定表查询失败等) 不会报错, 而是按零能量处理.
//!
//! # 开发计划
//!
//! ### 标定表 (desired slopes) 读取与插值 ✅
//!
//! 按照 `(width, dyn)` 对期望的内/外边缘斜率做双线性插值.
//!
//! 实现位于 `retina-berry/src/calibration.rs`.
//!
//! ### 边界描述子与特征缓存 ✅
//!
//! 沿标签梯度方向发射射线, 估计局部血管宽度, 动态范围与斜率比.
//!
//! 实现位于 `retina-berry/src/feature`.
//!
//! ### 随机局部搜索优化器 ✅
//!
//! 腐蚀阶段 + 膨胀阶段, 配合连通性保护和骨架端点保护.
//! 支持取消, 支持固定随机种子.
//!
//! 实现位于 `retina-berry/src/refine`.
//!
//! ### 细小血管补全 ✅
//!
//! 基于滤波器组响应的多门限区域生长.
//!
//! 实现位于 `retina-berry/src/refine/thin_objects.rs`.
//!
//! ### 三维线段一致性滤波与方向性扫描清理 ✅
//!
//! 1. 线段结构元生成, 去重与缓存持久化. ✅
//! 2. 任意线段 / 比例 / 双侧 / 角度覆盖四种保留判据. ✅
//! 3. 轴向, 冠状, 矢状三个方向的往返扫描, 直到不再删除体素. ✅
//!
//! 实现位于 `retina-berry/src/volume`.
//!
//! ### 小功能 ✅
//!
//! 1. 二维二值形态学, Zhang-Suen 细化, 8-连通区域提取. ✅
//! 2. 三维连通分量尺寸过滤. ✅
//! 3. 图像持久化 (`image`) 与体数据持久化 (`npy`). ✅

/// 二维索引 `(h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 二维有符号偏移 `(dh, dw)`.
pub type Offset2d = (isize, isize);

/// 三维有符号偏移 `(dz, dh, dw)`.
pub type Offset3d = (isize, isize, isize);

type Area2d = Vec<Idx2d>;
type Areas2d = Vec<Area2d>;

/// 二维图像与三维体数据基础结构.
mod data;

pub use data::{
    BinaryMask, Border3, BorderMode, ImgWriteRaw, ImgWriteVis, IntensityImage, LabelImage, Volume,
};

pub mod calibration;
pub mod consts;
pub mod error;
pub mod feature;
pub mod morph;
pub mod prelude;
pub mod refine;
pub mod volume;
