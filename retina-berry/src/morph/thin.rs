//! Zhang-Suen 细化与骨架端点保护区.

use super::{dilate_mask, StructElem2d};
use crate::data::{shift, N8};
use crate::{BinaryMask, Idx2d, LabelImage};

/// 顺时针 `P2..P9`: 上, 右上, 右, 右下, 下, 左下, 左, 左上.
const RING: [(isize, isize); 8] = [
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
];

/// 对前景做拓扑保持的 Zhang-Suen 细化, 返回骨架掩膜.
///
/// 图像外视为背景. 反复执行两个子迭代直到没有像素被删除.
pub fn thin(labels: &LabelImage) -> BinaryMask {
    let mut sk = labels.foreground_mask();
    let mut doomed: Vec<Idx2d> = Vec::new();

    loop {
        let mut changed = false;
        for second in [false, true] {
            doomed.extend(sk.positions().filter(|&pos| deletable(&sk, pos, second)));
            changed |= !doomed.is_empty();
            for pos in doomed.drain(..) {
                sk[pos] = false;
            }
        }
        if !changed {
            break;
        }
    }
    sk
}

/// 骨架端点: 骨架像素中, 8-邻域内至多一个骨架像素的那些.
pub fn endpoints(skeleton: &BinaryMask) -> BinaryMask {
    let shape = skeleton.shape();
    BinaryMask::from_shape_fn(shape, |pos| {
        skeleton[pos]
            && N8
                .iter()
                .filter(|&&d| shift(pos, d, shape).is_some_and(|p| skeleton[p]))
                .count()
                <= 1
    })
}

/// 优化器的骨架保护区: 细化 -> 端点 -> 3x3 膨胀.
///
/// 腐蚀阶段不会修改保护区内的像素, 以免细血管的末端被逐步吃掉.
pub fn skeleton_exclusion(labels: &LabelImage) -> BinaryMask {
    dilate_mask(&endpoints(&thin(labels)), &StructElem2d::square(1))
}

/// Zhang-Suen 删除条件.
fn deletable(sk: &BinaryMask, pos: Idx2d, second: bool) -> bool {
    let shape = sk.shape();
    let p = RING.map(|d| shift(pos, d, shape).is_some_and(|q| sk[q]));
    let b = p.iter().filter(|&&x| x).count();
    if !(2..=6).contains(&b) {
        return false;
    }
    let a = (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count();
    if a != 1 {
        return false;
    }
    // p[0] = P2, p[2] = P4, p[4] = P6, p[6] = P8.
    if second {
        !(p[0] && p[2] && p[6]) && !(p[0] && p[4] && p[6])
    } else {
        !(p[0] && p[2] && p[4]) && !(p[2] && p[4] && p[6])
    }
}
