//! 优化器参数.

use crate::error::{ConfigError, ConfigResult};
use crate::morph::Connectivity;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 随机局部搜索优化器的参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RefineParams {
    /// 外层迭代次数上限. 负数表示不限, 此时仅由收敛终止.
    pub max_iterations: i32,

    /// 前多少次外层迭代处于腐蚀 (inner) 阶段.
    pub inner_iterations: u32,

    /// 每次外层迭代的最大扫描 (sweep) 次数.
    pub max_sweeps: u32,

    /// 每次扫描的采样倍率: 采样 `oversampling * 候选数` 次, 有放回.
    pub oversampling: u32,

    /// 内侧期望斜率修正系数.
    pub imult: f32,

    /// 外侧期望斜率修正系数 (仅在 `imult < 1` 时使用).
    pub omult: f32,

    /// 邻域项权重.
    pub neighbour_weight: f32,

    /// 动态范围门限, 低于该值的像素能量为 0.
    pub dynth: f32,

    /// 宽度低于该值且处于腐蚀阶段时, 邻域项不参与.
    pub thin_width: f32,

    /// 结束时是否计算误差摘要.
    pub compute_error: bool,

    /// 随机种子. 每次运行只播种一次.
    pub seed: u64,

    /// 连通性保护使用的邻接表.
    pub connectivity: Connectivity,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            inner_iterations: 1,
            max_sweeps: 40,
            oversampling: 4,
            imult: 1.0,
            omult: 1.0,
            neighbour_weight: 1.7,
            dynth: 12.0,
            thin_width: 2.0,
            compute_error: true,
            seed: 0,
            connectivity: Connectivity::CornerGuarded,
        }
    }
}

impl RefineParams {
    /// 检查参数合法性.
    pub fn validate(&self) -> ConfigResult<()> {
        let finite_non_neg = |name: &'static str, v: f32| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::InvalidParameter {
                    name,
                    reason: "must be finite and non-negative",
                })
            }
        };
        finite_non_neg("imult", self.imult)?;
        finite_non_neg("omult", self.omult)?;
        finite_non_neg("neighbour_weight", self.neighbour_weight)?;
        finite_non_neg("dynth", self.dynth)?;
        finite_non_neg("thin_width", self.thin_width)?;
        if self.imult == 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "imult",
                reason: "must be positive",
            });
        }
        if self.oversampling == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "oversampling",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(RefineParams::default().validate().is_ok());
        let p = RefineParams {
            neighbour_weight: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            p.validate(),
            Err(ConfigError::InvalidParameter {
                name: "neighbour_weight",
                ..
            })
        ));
        let p = RefineParams {
            oversampling: 0,
            ..Default::default()
        };
        assert!(p.validate().is_err());
        let p = RefineParams {
            imult: 0.0,
            ..Default::default()
        };
        assert!(p.validate().is_err());
    }
}
