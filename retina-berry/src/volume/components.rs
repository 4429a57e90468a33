//! 三维 6-连通分量.

use crate::consts::gray::{is_voxel_foreground, VOXEL_BACKGROUND};
use crate::{Idx3d, Volume};
use log::debug;
use std::collections::VecDeque;

/// 获取 `pos` 前后上下左右六个点中不越界的那些.
#[inline]
fn diamond_neighbours((z, h, w): Idx3d, shape: Idx3d) -> impl Iterator<Item = Idx3d> {
    [
        (z.wrapping_sub(1), h, w),
        (z.saturating_add(1), h, w),
        (z, h.wrapping_sub(1), w),
        (z, h.saturating_add(1), w),
        (z, h, w.wrapping_sub(1)),
        (z, h, w.saturating_add(1)),
    ]
    .into_iter()
    .filter(move |&(a, b, c)| a < shape.0 && b < shape.1 && c < shape.2)
}

/// 前景体素的 6-连通分量.
///
/// # 返回值
///
/// 分量按首个体素的行优先顺序排列, 分量内为 BFS 访问顺序.
pub fn components6(volume: &Volume<u8>) -> Vec<Vec<Idx3d>> {
    let shape = volume.shape();
    let (_, hl, wl) = shape;
    let flat = |(z, h, w): Idx3d| (z * hl + h) * wl + w;
    let mut visited = vec![false; volume.len()];
    let mut components = Vec::new();
    let mut q = VecDeque::new();

    for (start, &v) in volume.view().indexed_iter() {
        if visited[flat(start)] || !is_voxel_foreground(v) {
            continue;
        }
        visited[flat(start)] = true;
        let mut comp = Vec::new();
        q.push_back(start);
        while let Some(cur) = q.pop_front() {
            comp.push(cur);
            for p in diamond_neighbours(cur, shape) {
                if !visited[flat(p)] && is_voxel_foreground(volume[p]) {
                    visited[flat(p)] = true;
                    q.push_back(p);
                }
            }
        }
        components.push(comp);
    }
    components
}

/// 只保留体素数在 `[min, max)` 内的 6-连通分量. `None` 表示不限制该侧.
///
/// # 返回值
///
/// 被删除的体素个数.
pub fn filter_components_by_size(volume: &mut Volume<u8>, min: Option<usize>, max: Option<usize>) -> usize {
    let mut removed = 0;
    let comps = components6(volume);
    let total = comps.len();
    for comp in comps {
        let n = comp.len();
        if min.map_or(true, |m| n >= m) && max.map_or(true, |m| n < m) {
            continue;
        }
        removed += n;
        for p in comp {
            volume[p] = VOXEL_BACKGROUND;
        }
    }
    debug!("component size filter: {total} components, {removed} voxels removed");
    removed
}

/// 只保留最大的 6-连通分量. 多个分量同样大时保留行优先顺序最靠前的.
///
/// # 返回值
///
/// 被删除的体素个数.
pub fn keep_largest_component(volume: &mut Volume<u8>) -> usize {
    let comps = components6(volume);
    let Some(largest) = comps
        .iter()
        .enumerate()
        .max_by_key(|(i, c)| (c.len(), std::cmp::Reverse(*i)))
        .map(|(i, _)| i)
    else {
        return 0;
    };
    let mut removed = 0;
    for (i, comp) in comps.into_iter().enumerate() {
        if i != largest {
            removed += comp.len();
            for p in comp {
                volume[p] = VOXEL_BACKGROUND;
            }
        }
    }
    removed
}
