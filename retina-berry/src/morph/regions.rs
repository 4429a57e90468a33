//! 8-连通区域提取.

use crate::data::{shift, N8};
use crate::{Area2d, Areas2d, Idx2d};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use std::collections::VecDeque;

/// 提取满足 `pred` 的像素组成的所有 8-连通区域.
///
/// # 返回值
///
/// 区域按首个像素的行优先顺序排列; 区域内像素为 BFS 访问顺序.
pub fn regions8<F: Fn(Idx2d) -> bool>(shape: Idx2d, pred: F) -> Areas2d {
    let (h, w) = shape;
    let mut visited = vec![false; h * w];
    let mut areas = Areas2d::new();
    let mut q = VecDeque::new();

    for start in (0..h).cartesian_product(0..w) {
        if visited[start.0 * w + start.1] || !pred(start) {
            continue;
        }
        visited[start.0 * w + start.1] = true;
        let mut area = Area2d::new();
        q.push_back(start);
        while let Some(cur) = q.pop_front() {
            area.push(cur);
            for &d in N8.iter() {
                let Some(p) = shift(cur, d, shape) else {
                    continue;
                };
                let k = p.0 * w + p.1;
                if !visited[k] && pred(p) {
                    visited[k] = true;
                    q.push_back(p);
                }
            }
        }
        areas.push(area);
    }
    areas
}

/// 区域内相距最远的两个像素的欧氏距离. 少于两个像素时返回 0.
pub fn farthest_distance(area: &[Idx2d]) -> f32 {
    area.iter()
        .tuple_combinations()
        .map(|(a, b)| {
            let dh = a.0 as f32 - b.0 as f32;
            let dw = a.1 as f32 - b.1 as f32;
            OrderedFloat((dh * dh + dw * dw).sqrt())
        })
        .max()
        .map_or(0.0, |d| d.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regions8() {
        let m = array![
            [1, 0, 0, 1],
            [0, 1, 0, 1],
            [0, 0, 0, 0],
            [1, 1, 0, 1],
        ];
        let areas = regions8((4, 4), |p| m[p] == 1);
        assert_eq!(areas.len(), 4);
        assert_eq!(areas[0].len(), 2); // 对角连通.
        assert_eq!(areas[1], vec![(0, 3), (1, 3)]);
        assert_eq!(areas[2].len(), 2);
        assert_eq!(areas[3], vec![(3, 3)]);
        assert!(regions8((0, 3), |_| true).is_empty());
    }

    #[test]
    fn test_farthest_distance() {
        assert_eq!(farthest_distance(&[]), 0.0);
        assert_eq!(farthest_distance(&[(1, 1)]), 0.0);
        assert_eq!(farthest_distance(&[(0, 0), (0, 1), (3, 4)]), 5.0);
    }
}
