//! 通用常量.

/// 单通道颜色与标签取值.
pub mod gray {
    /// 二维标签图像中, 背景的像素值.
    pub const LABEL_BACKGROUND: u8 = 0;

    /// 二维标签图像中, 前景 (血管) 的像素值.
    pub const LABEL_FOREGROUND: u8 = 255;

    /// 三维体数据中, 背景的体素值.
    pub const VOXEL_BACKGROUND: u8 = 0;

    /// 三维体数据中, 前景的体素值.
    pub const VOXEL_FOREGROUND: u8 = 1;

    /// 方向性扫描中, "已确认" 体素的临时标记值.
    pub const VOXEL_CONFIRMED: u8 = 2;

    /// 单通道黑色.
    pub const BLACK: u8 = 0b_0000_0000;

    /// 单通道白色.
    pub const WHITE: u8 = 0b_1111_1111;

    /// 像素是否是前景?
    #[inline]
    pub const fn is_foreground(p: u8) -> bool {
        matches!(p, LABEL_FOREGROUND)
    }

    /// 像素是否是背景?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        matches!(p, LABEL_BACKGROUND)
    }

    /// 体素是否是前景 (含已确认)?
    #[inline]
    pub const fn is_voxel_foreground(v: u8) -> bool {
        matches!(v, VOXEL_FOREGROUND | VOXEL_CONFIRMED)
    }

    /// 体素是否已确认?
    #[inline]
    pub const fn is_confirmed(v: u8) -> bool {
        matches!(v, VOXEL_CONFIRMED)
    }

    /// 翻转二维标签像素.
    #[inline]
    pub const fn flipped(p: u8) -> u8 {
        if is_foreground(p) {
            LABEL_BACKGROUND
        } else {
            LABEL_FOREGROUND
        }
    }
}

/// 标定表: 宽度方向的上界 (不含). 超过该宽度的查询按最后一列处理.
pub const UPPER_WIDTH: usize = 90;

/// 标定表: 动态范围方向的上界 (不含). 超过该值的查询使用汇总行.
pub const UPPER_DYN: usize = 90;

/// 标定表: 宽度超界时, 仍然按列插值的动态范围门限.
pub const TABLE_THRESHOLD: f32 = 50.0;

/// 标定文件个数, 文件编号为 `1..=CALIBRATION_BUCKETS`.
pub const CALIBRATION_BUCKETS: usize = 69;

/// 标定表汇总行所平均的尾部行数.
pub const SUMMARY_ROWS: usize = 10;

/// 像素/体素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ElemType {
    /// 代表背景.
    Background,

    /// 代表前景.
    Foreground,
}

impl ElemType {
    /// 是否为前景.
    #[inline]
    pub fn is_foreground(&self) -> bool {
        matches!(self, Self::Foreground)
    }

    /// 是否为背景.
    #[inline]
    pub fn is_background(&self) -> bool {
        !self.is_foreground()
    }

    /// 由二维标签像素值得到类型.
    #[inline]
    pub fn of_label(p: u8) -> Self {
        if gray::is_foreground(p) {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

#[cfg(test)]
mod tests {
    use super::gray::*;
    use super::ElemType;

    #[test]
    fn test_flip() {
        assert_eq!(flipped(LABEL_FOREGROUND), LABEL_BACKGROUND);
        assert_eq!(flipped(LABEL_BACKGROUND), LABEL_FOREGROUND);
        assert!(ElemType::of_label(255).is_foreground());
        assert!(ElemType::of_label(0).is_background());
        assert!(is_voxel_foreground(VOXEL_CONFIRMED));
        assert!(!is_voxel_foreground(VOXEL_BACKGROUND));
    }
}
