use super::{shift, N8, N9};
use crate::consts::gray::*;
use crate::Idx2d;
use ndarray::iter::IndexedIter;
use ndarray::{Array2, ArrayView2, ArrayViewMut2, Ix2, Zip};
use std::ops::{Index, IndexMut};

/// 二维血管标签图像. 仅允许 `LABEL_BACKGROUND` 与 `LABEL_FOREGROUND` 两种像素.
///
/// 图像外的像素一律视作背景, 访问越界不会 panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelImage {
    data: Array2<u8>,
}

/// 二维灰度 (强度) 图像, 只读输入.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityImage {
    data: Array2<f32>,
}

/// 二维二值掩膜. 用于 ROI, 候选像素集合与骨架保护区.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    data: Array2<bool>,
}

/// 三种图像共享的不可变/可变方法.
macro_rules! impl_image_common {
    ($img: ty, $elem: ty) => {
        impl $img {
            /// 直接由底层数组初始化.
            #[inline]
            pub fn new(data: Array2<$elem>) -> Self {
                Self { data }
            }

            /// 按 `f(pos)` 逐像素初始化.
            #[inline]
            pub fn from_shape_fn<F: FnMut(Idx2d) -> $elem>(shape: Idx2d, f: F) -> Self {
                Self::new(Array2::from_shape_fn(shape, f))
            }

            /// 获得底层数据的不可变视图.
            #[inline]
            pub fn array_view(&self) -> ArrayView2<$elem> {
                self.data.view()
            }

            /// 获得底层数据的可变视图.
            #[inline]
            pub fn array_view_mut(&mut self) -> ArrayViewMut2<$elem> {
                self.data.view_mut()
            }

            /// 直接获得内部数据的所有权.
            #[inline]
            pub fn into_raw(self) -> Array2<$elem> {
                self.data
            }

            /// 图像的分辨率 (高, 宽).
            #[inline]
            pub fn shape(&self) -> Idx2d {
                self.data.dim()
            }

            /// 图像的像素个数.
            #[inline]
            pub fn size(&self) -> usize {
                self.data.len()
            }

            /// 判断一个索引是否合法 (未越界).
            #[inline]
            pub fn check(&self, (h, w): Idx2d) -> bool {
                let (h_len, w_len) = self.shape();
                h < h_len && w < w_len
            }

            /// 获取给定位置 (高, 宽) 的像素值. 越界时返回 `None`.
            #[inline]
            pub fn get(&self, pos: Idx2d) -> Option<&$elem> {
                self.data.get(pos)
            }

            /// 带索引的行优先迭代器.
            #[inline]
            pub fn indexed_iter(&self) -> IndexedIter<'_, $elem, Ix2> {
                self.data.indexed_iter()
            }
        }

        impl Index<Idx2d> for $img {
            type Output = $elem;

            #[inline]
            fn index(&self, index: Idx2d) -> &Self::Output {
                &self.data[index]
            }
        }

        impl IndexMut<Idx2d> for $img {
            #[inline]
            fn index_mut(&mut self, index: Idx2d) -> &mut Self::Output {
                &mut self.data[index]
            }
        }

        impl From<Array2<$elem>> for $img {
            #[inline]
            fn from(data: Array2<$elem>) -> Self {
                Self::new(data)
            }
        }
    };
}

impl_image_common!(LabelImage, u8);
impl_image_common!(IntensityImage, f32);
impl_image_common!(BinaryMask, bool);

impl LabelImage {
    /// 全背景图像.
    #[inline]
    pub fn background(shape: Idx2d) -> Self {
        Self::new(Array2::from_elem(shape, LABEL_BACKGROUND))
    }

    /// 由二值数组构造, `true` 为前景.
    pub fn from_mask(mask: &BinaryMask) -> Self {
        Self::new(mask.data.map(|&b| if b { LABEL_FOREGROUND } else { LABEL_BACKGROUND }))
    }

    /// 给定位置是否为前景. 越界视为背景.
    #[inline]
    pub fn is_fg(&self, pos: Idx2d) -> bool {
        self.get(pos).is_some_and(|&p| is_foreground(p))
    }

    /// 给定位置的标签值. 越界视为背景.
    #[inline]
    pub fn label_or_bg(&self, pos: Idx2d) -> u8 {
        self.get(pos).copied().unwrap_or(LABEL_BACKGROUND)
    }

    /// 该图是否为全背景图?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.data.iter().copied().all(is_background)
    }

    /// 统计前景像素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&p| is_foreground(p)).count()
    }

    /// 是否为内轮廓像素: 自身为前景, 且 8-邻域内存在背景 (图像外视为背景).
    pub fn is_inner_contour8(&self, pos: Idx2d) -> bool {
        self.is_fg(pos) && self.any_n8(pos, |fg| !fg)
    }

    /// 是否为外轮廓像素: 自身为背景, 且 8-邻域内存在前景.
    pub fn is_outer_contour8(&self, pos: Idx2d) -> bool {
        self.check(pos) && !self.is_fg(pos) && self.any_n8(pos, |fg| fg)
    }

    /// 内轮廓或外轮廓.
    #[inline]
    pub fn is_contour8(&self, pos: Idx2d) -> bool {
        self.is_inner_contour8(pos) || self.is_outer_contour8(pos)
    }

    /// 以 `pos` 为中心的 3x3 子图, 行优先, 越界填充背景.
    pub fn subimage3x3(&self, pos: Idx2d) -> [u8; 9] {
        let shape = self.shape();
        N9.map(|d| shift(pos, d, shape).map_or(LABEL_BACKGROUND, |p| self.data[p]))
    }

    /// 8-邻域内取值为 `label` 的像素个数. 越界视为背景.
    pub fn count_n8_equal(&self, pos: Idx2d, label: u8) -> usize {
        let shape = self.shape();
        N8.iter()
            .filter(|&&d| shift(pos, d, shape).map_or(LABEL_BACKGROUND, |p| self.data[p]) == label)
            .count()
    }

    /// 前景掩膜.
    pub fn foreground_mask(&self) -> BinaryMask {
        BinaryMask::new(self.data.map(|&p| is_foreground(p)))
    }

    /// 两幅标签图像的差异掩膜.
    ///
    /// # 注意
    ///
    /// 形状不一致时 panic.
    pub fn diff(&self, other: &LabelImage) -> BinaryMask {
        assert_eq!(self.shape(), other.shape(), "标签图像形状不一致");
        let mut out = Array2::from_elem(self.shape(), false);
        Zip::from(&mut out)
            .and(&self.data)
            .and(&other.data)
            .for_each(|o, &a, &b| *o = a != b);
        BinaryMask::new(out)
    }

    /// 8-邻域中是否存在满足 `pred(is_fg)` 的像素, 越界像素按背景参与判断.
    #[inline]
    fn any_n8<F: Fn(bool) -> bool>(&self, pos: Idx2d, pred: F) -> bool {
        let shape = self.shape();
        N8.iter()
            .any(|&d| pred(shift(pos, d, shape).is_some_and(|p| is_foreground(self.data[p]))))
    }
}

impl IntensityImage {
    /// 常数图像.
    #[inline]
    pub fn constant(shape: Idx2d, value: f32) -> Self {
        Self::new(Array2::from_elem(shape, value))
    }

    /// 最小值与最大值. 空图像返回 `None`.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        }))
    }

    /// 线性归一化到 `[0, 1]`. 常数图像归一化为全 0.
    pub fn normalized(&self) -> IntensityImage {
        let Some((lo, hi)) = self.min_max() else {
            return self.clone();
        };
        let span = hi - lo;
        if span <= 0.0 {
            return Self::constant(self.shape(), 0.0);
        }
        Self::new(self.data.map(|&v| (v - lo) / span))
    }
}

impl BinaryMask {
    /// 全 `false` 掩膜.
    #[inline]
    pub fn zeros(shape: Idx2d) -> Self {
        Self::new(Array2::from_elem(shape, false))
    }

    /// 全 `true` 掩膜.
    #[inline]
    pub fn full(shape: Idx2d) -> Self {
        Self::new(Array2::from_elem(shape, true))
    }

    /// 给定位置是否被选中. 越界返回 `false`.
    #[inline]
    pub fn contains(&self, pos: Idx2d) -> bool {
        self.get(pos).copied().unwrap_or(false)
    }

    /// 被选中的像素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// 行优先迭代所有被选中的位置.
    pub fn positions(&self) -> impl Iterator<Item = Idx2d> + '_ {
        self.data.indexed_iter().filter(|(_, &b)| b).map(|(p, _)| p)
    }

    /// `self & !other`.
    pub fn and_not(&self, other: &BinaryMask) -> BinaryMask {
        assert_eq!(self.shape(), other.shape(), "掩膜形状不一致");
        let mut out = self.data.clone();
        Zip::from(&mut out).and(&other.data).for_each(|o, &b| *o &= !b);
        BinaryMask::new(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn block() -> LabelImage {
        LabelImage::new(array![
            [0, 0, 0, 0, 0],
            [0, 255, 255, 255, 0],
            [0, 255, 255, 255, 0],
            [0, 255, 255, 255, 0],
            [0, 0, 0, 0, 0],
        ])
    }

    #[test]
    fn test_contours() {
        let img = block();
        assert!(img.is_inner_contour8((1, 1)));
        assert!(!img.is_inner_contour8((2, 2)));
        assert!(img.is_outer_contour8((0, 0)));
        assert!(!img.is_outer_contour8((2, 2)));
        assert!(!img.is_outer_contour8((9, 9)));
        assert!(img.is_contour8((4, 2)));
        assert_eq!(img.count_foreground(), 9);
    }

    #[test]
    fn test_image_border_is_background() {
        let img = LabelImage::new(array![[255, 255], [255, 255]]);
        // 图像外视为背景, 因此所有像素都是内轮廓.
        assert!(img.is_inner_contour8((0, 0)));
        assert_eq!(img.subimage3x3((0, 0)), [0, 0, 0, 0, 255, 255, 0, 255, 255]);
        assert_eq!(img.count_n8_equal((0, 0), LABEL_FOREGROUND), 3);
        assert_eq!(img.count_n8_equal((0, 0), LABEL_BACKGROUND), 5);
    }

    #[test]
    fn test_masks() {
        let a = block();
        let mut b = a.clone();
        b[(2, 2)] = LABEL_BACKGROUND;
        let d = a.diff(&b);
        assert_eq!(d.count(), 1);
        assert_eq!(d.positions().collect::<Vec<_>>(), vec![(2, 2)]);
        assert_eq!(a.foreground_mask().and_not(&d).count(), 8);
        assert_eq!(LabelImage::from_mask(&b.foreground_mask()), b);
        assert!(!d.contains((7, 7)));
    }

    #[test]
    fn test_normalized() {
        let img = IntensityImage::new(array![[10.0, 20.0], [30.0, 50.0]]);
        assert_eq!(img.min_max(), Some((10.0, 50.0)));
        let n = img.normalized();
        assert_eq!(n[(0, 0)], 0.0);
        assert_eq!(n[(1, 1)], 1.0);
        assert_eq!(n[(0, 1)], 0.25);
        let c = IntensityImage::constant((2, 2), 3.0).normalized();
        assert!(c.indexed_iter().all(|(_, &v)| v == 0.0));
    }
}
