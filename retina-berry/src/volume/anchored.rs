//! 切片级锚定区域清理: 每个水平切片上只保留与 `keep` 相交的 8-连通前景区域.

use super::{check_volume, is_set};
use crate::consts::gray::{is_voxel_foreground, VOXEL_FOREGROUND};
use crate::error::ConfigResult;
use crate::morph::regions8;
use crate::Volume;
use log::info;
use ndarray::{Array3, ArrayViewMut2, Axis, Zip};

/// 逐个水平切片:
///
/// - `roi` 在该切片上为空时, 原样复制;
/// - `keep` 在该切片上为空时, 整片清空;
/// - 否则只保留与 `keep` 相交的 8-连通前景区域 (取值 1).
///
/// 最后 `keep` 内的体素一律复制输入值.
///
/// # 返回值
///
/// 输出体数据与修改的体素个数.
pub fn keep_anchored_regions(
    input: &Volume<u8>,
    keep: &Volume<u8>,
    roi: Option<&Volume<u8>>,
) -> ConfigResult<(Volume<u8>, usize)> {
    let shape = input.shape();
    check_volume(shape, keep.shape())?;
    if let Some(r) = roi {
        check_volume(shape, r.shape())?;
    }

    let mut out = Array3::<u8>::zeros(shape);
    let per_slice = |z: usize, mut slice: ArrayViewMut2<u8>| {
        let src = input.slice_z(z);
        if roi.is_some_and(|r| !r.slice_z(z).iter().any(|&v| v != 0)) {
            slice.assign(&src);
            return;
        }
        let anchors = keep.slice_z(z);
        if !anchors.iter().any(|&v| v != 0) {
            return;
        }
        for area in regions8(src.dim(), |p| is_voxel_foreground(src[p])) {
            if area.iter().any(|&p| anchors[p] != 0) {
                for p in area {
                    slice[p] = VOXEL_FOREGROUND;
                }
            }
        }
    };
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            Zip::indexed(out.axis_iter_mut(Axis(0))).par_for_each(per_slice);
        } else {
            Zip::indexed(out.axis_iter_mut(Axis(0))).for_each(per_slice);
        }
    }

    let mut output = Volume::new(out).with_border_mode(input.border_mode());
    let mut changed = 0;
    Zip::indexed(output.view_mut()).for_each(|pos, o| {
        if is_set(keep, pos) {
            *o = input[pos];
        }
        changed += usize::from(*o != input[pos]);
    });
    info!("anchored region cleaning: {changed} voxels changed");
    Ok((output, changed))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 两个切片. 切片 0 上两个区域, 只有左边的有锚点; 切片 1 上没有锚点.
    fn setup() -> (Volume<u8>, Volume<u8>) {
        let mut v = Volume::<u8>::zeros((2, 4, 6));
        for h in 0..4 {
            v[(0, h, 0)] = 1;
            v[(0, h, 4)] = 1;
            v[(1, h, 2)] = 1;
        }
        v[(0, 1, 1)] = 1;
        let mut keep = Volume::<u8>::zeros((2, 4, 6));
        keep[(0, 3, 1)] = 1;
        keep[(0, 2, 0)] = 1;
        (v, keep)
    }

    #[test]
    fn test_anchored() {
        let (v, keep) = setup();
        let (out, changed) = keep_anchored_regions(&v, &keep, None).unwrap();
        // 左侧区域 (含对角相连的 (1, 1)) 保留.
        assert_eq!(out[(0, 0, 0)], 1);
        assert_eq!(out[(0, 1, 1)], 1);
        // keep 内但输入为背景的体素不会变成前景.
        assert_eq!(out[(0, 3, 1)], 0);
        assert_eq!(out[(0, 2, 4)], 0);
        // 没有锚点的切片被清空.
        assert_eq!(out.slice_z(1).iter().filter(|&&x| x != 0).count(), 0);
        assert_eq!(changed, 8);
    }

    #[test]
    fn test_roi() {
        let (v, keep) = setup();
        let mut roi = Volume::<u8>::zeros((2, 4, 6));
        roi[(0, 0, 0)] = 1;
        let (out, changed) = keep_anchored_regions(&v, &keep, Some(&roi)).unwrap();
        // 切片 1 的 ROI 为空, 原样复制.
        assert_eq!(out[(1, 0, 2)], 1);
        assert_eq!(changed, 4);

        let bad = Volume::<u8>::zeros((1, 4, 6));
        assert!(keep_anchored_regions(&v, &bad, None).is_err());
    }
}
