//! 构造期错误.
//!
//! 运行期的单像素退化 (例如标定表查询失败) 不属于错误, 它们以 `None` 表示,
//! 并在能量函数处按零贡献处理.

use crate::Idx2d;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 标定表读取错误.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// 缺少编号为 `bucket` 的标定文件.
    #[error("missing calibration bucket {bucket} at {path:?}")]
    MissingBucket {
        /// 文件编号.
        bucket: usize,
        /// 期望的文件路径.
        path: PathBuf,
        /// 底层 IO 错误.
        #[source]
        source: io::Error,
    },

    /// 标定文件格式错误.
    #[error("malformed calibration bucket {bucket}: {reason}")]
    Malformed {
        /// 文件编号.
        bucket: usize,
        /// 错误描述.
        reason: String,
    },

    /// 没有提供任何标定行.
    #[error("calibration table has no buckets")]
    NoBuckets,
}

/// 参数或输入配置错误.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 输入图像形状不一致.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 期望形状.
        expected: Idx2d,
        /// 实际形状.
        found: Idx2d,
    },

    /// 三维输入形状不一致.
    #[error("volume shape mismatch: expected {expected:?}, found {found:?}")]
    VolumeShapeMismatch {
        /// 期望形状.
        expected: [usize; 3],
        /// 实际形状.
        found: [usize; 3],
    },

    /// 参数取值非法.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// 参数名.
        name: &'static str,
        /// 原因.
        reason: &'static str,
    },
}

/// 线段结构元缓存文件错误.
#[derive(Debug, Error)]
pub enum CacheError {
    /// 读写失败.
    #[error("line bank cache io error")]
    Io(#[from] io::Error),

    /// 缓存内容无法解析.
    #[error("malformed line bank cache: {0}")]
    Malformed(String),
}

/// 标定表相关的 `Result`.
pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// 配置相关的 `Result`.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 缓存相关的 `Result`.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let e = ConfigError::ShapeMismatch {
            expected: (3, 4),
            found: (4, 3),
        };
        assert_eq!(e.to_string(), "shape mismatch: expected (3, 4), found (4, 3)");
        let e = CalibrationError::Malformed {
            bucket: 7,
            reason: "truncated".to_string(),
        };
        assert_eq!(e.to_string(), "malformed calibration bucket 7: truncated");
    }
}
