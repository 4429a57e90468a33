//! 二值形态学腐蚀与膨胀.

use super::StructElem2d;
use crate::consts::gray::*;
use crate::data::shift;
use crate::{BinaryMask, Idx2d, LabelImage};
use ndarray::{Array2, Zip};

/// 以 `se` 腐蚀标签图像. 图像外视为背景.
///
/// 若指定 `roi`, 则 ROI 外的像素原样复制.
pub fn erode(labels: &LabelImage, se: &StructElem2d, roi: Option<&BinaryMask>) -> LabelImage {
    let shape = labels.shape();
    morph_with(labels, roi, |pos| {
        se.offsets()
            .iter()
            .all(|&d| shift(pos, d, shape).is_some_and(|p| is_foreground(labels[p])))
    })
}

/// 以 `se` 膨胀标签图像. 图像外的像素不参与.
///
/// 若指定 `roi`, 则 ROI 外的像素原样复制.
pub fn dilate(labels: &LabelImage, se: &StructElem2d, roi: Option<&BinaryMask>) -> LabelImage {
    let shape = labels.shape();
    morph_with(labels, roi, |pos| {
        se.offsets()
            .iter()
            .any(|&d| shift(pos, d, shape).is_some_and(|p| is_foreground(labels[p])))
    })
}

/// 以 `se` 膨胀二值掩膜.
pub fn dilate_mask(mask: &BinaryMask, se: &StructElem2d) -> BinaryMask {
    let shape = mask.shape();
    BinaryMask::from_shape_fn(shape, |pos| {
        se.offsets()
            .iter()
            .any(|&d| shift(pos, d, shape).is_some_and(|p| mask[p]))
    })
}

/// 逐像素计算 `is_fg(pos)`, ROI 外复制 `input`.
fn morph_with<F>(input: &LabelImage, roi: Option<&BinaryMask>, is_fg: F) -> LabelImage
where
    F: Fn(Idx2d) -> bool + Sync,
{
    let mut out = Array2::from_elem(input.shape(), LABEL_BACKGROUND);
    let op = |pos: Idx2d, o: &mut u8| {
        *o = if roi.map_or(true, |r| r.contains(pos)) {
            if is_fg(pos) {
                LABEL_FOREGROUND
            } else {
                LABEL_BACKGROUND
            }
        } else {
            input[pos]
        };
    };
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            Zip::indexed(&mut out).par_for_each(op);
        } else {
            Zip::indexed(&mut out).for_each(op);
        }
    }
    LabelImage::new(out)
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
    fn test_erode_dilate() {
        let img = block();
        let e = erode(&img, &StructElem2d::square(1), None);
        assert_eq!(e.count_foreground(), 1);
        assert!(e.is_fg((2, 2)));

        let e = erode(&img, &StructElem2d::disk(1), None);
        assert_eq!(e.count_foreground(), 1);

        let d = dilate(&img, &StructElem2d::disk(1), None);
        // 3x3 块 + 四条边各 3 个像素.
        assert_eq!(d.count_foreground(), 21);
        let d = dilate(&img, &StructElem2d::square(1), None);
        assert_eq!(d.count_foreground(), 25);
    }

    #[test]
    fn test_roi_copies_input() {
        let img = block();
        let mut roi = BinaryMask::zeros(img.shape());
        roi[(1, 1)] = true;
        let e = erode(&img, &StructElem2d::square(1), Some(&roi));
        assert!(!e.is_fg((1, 1)));
        assert_eq!(e.count_foreground(), 8);
    }

    #[test]
    fn test_dilate_mask() {
        let mut m = BinaryMask::zeros((3, 3));
        m[(0, 0)] = true;
        let d = dilate_mask(&m, &StructElem2d::square(1));
        assert_eq!(d.count(), 4);
    }
}
