//! 图像的持久化存储.

use super::{BinaryMask, IntensityImage, LabelImage};
use image::ImageResult;
use std::path::Path;

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 对于 `LabelImage`, `BinaryMask` 这类二值图像, 在保存时映射为黑白两色;
/// 对于 `IntensityImage`, 在保存时按最小/最大值线性拉伸到 `0..=255`.
pub trait ImgWriteVis {
    /// 按照一定的可视化规则将图片保存到 `path` 路径.
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
///
/// 只有 `u8` 像素的 `LabelImage` 可以按原样保存.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 使像素更有利于单通道可视化.
#[inline]
pub(crate) fn pretty(label: u8) -> u8 {
    use crate::consts::gray::*;
    match label {
        LABEL_BACKGROUND => BLACK,
        LABEL_FOREGROUND => WHITE,
        any_else => panic!("只允许图像存在 0, 255 像素, 但发现了 `{any_else}`"),
    }
}

/// 将 `(h, w) -> u8` 映射写进灰度图并保存.
fn save_gray<P, F>((height, width): (usize, usize), path: P, pix: F) -> ImageResult<()>
where
    P: AsRef<Path>,
    F: Fn(usize, usize) -> u8,
{
    let buf = image::GrayImage::from_fn(width as u32, height as u32, |w, h| {
        image::Luma([pix(h as usize, w as usize)])
    });
    buf.save(path)
}

/// 背景/前景分别映射为黑色/白色. 不允许其他颜色.
impl ImgWriteVis for LabelImage {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        save_gray(self.shape(), path, |h, w| pretty(self[(h, w)]))
    }
}

/// 按原样存储.
impl ImgWriteRaw for LabelImage {
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        save_gray(self.shape(), path, |h, w| self[(h, w)])
    }
}

/// 选中为白色, 其余为黑色.
impl ImgWriteVis for BinaryMask {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        use crate::consts::gray::{BLACK, WHITE};
        save_gray(self.shape(), path, |h, w| if self[(h, w)] { WHITE } else { BLACK })
    }
}

/// 线性拉伸到 `0..=255`.
impl ImgWriteVis for IntensityImage {
    fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let n = self.normalized();
        save_gray(self.shape(), path, |h, w| (n[(h, w)] * 255.0).round() as u8)
    }
}
