//! 3x3 局部连通性保护.

use crate::morph::NeighborOffsetTable;

/// 3x3 子图 (行优先, 中心下标 4) 中非零格子的连通分量个数.
pub fn component_count(cells: &[u8; 9], table: &NeighborOffsetTable) -> usize {
    let mut seen = [false; 9];
    let mut stack = [0usize; 9];
    let mut count = 0;
    for start in 0..9 {
        if cells[start] == 0 || seen[start] {
            continue;
        }
        count += 1;
        seen[start] = true;
        let mut top = 1;
        stack[0] = start;
        while top > 0 {
            top -= 1;
            let cur = stack[top];
            for &n in table.neighbours(cur) {
                if cells[n] != 0 && !seen[n] {
                    seen[n] = true;
                    stack[top] = n;
                    top += 1;
                }
            }
        }
    }
    count
}

/// 清除中心前后的分量个数 `(before, after)`.
pub fn split_counts(snapshot: &[u8; 9], table: &NeighborOffsetTable) -> (usize, usize) {
    let before = component_count(snapshot, table);
    let mut cleared = *snapshot;
    cleared[4] = 0;
    (before, component_count(&cleared, table))
}

/// 把中心置为背景是否会把局部前景分裂为更多分量.
#[inline]
pub fn would_disconnect(snapshot: &[u8; 9], table: &NeighborOffsetTable) -> bool {
    let (before, after) = split_counts(snapshot, table);
    before < after
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: u8 = 255;

    #[test]
    fn test_plus_shape_splits_into_four() {
        let plus = [0, F, 0, F, F, F, 0, F, 0];
        let t = NeighborOffsetTable::default();
        assert_eq!(split_counts(&plus, &t), (1, 4));
        assert!(would_disconnect(&plus, &t));
        // 历史 8-连通表中, 四个边中点两两相连.
        assert_eq!(split_counts(&plus, &NeighborOffsetTable::legacy()), (1, 1));
    }

    #[test]
    fn test_isolated_pixel_never_disconnects() {
        let t = NeighborOffsetTable::default();
        let lone = [0, 0, 0, 0, F, 0, 0, 0, 0];
        assert_eq!(split_counts(&lone, &t), (1, 0));
        assert!(!would_disconnect(&lone, &t));
        // 上方三个格子本身连通, 移除中心不会分裂.
        let cap = [F, F, F, 0, F, 0, 0, 0, 0];
        assert!(!would_disconnect(&cap, &t));
    }

    #[test]
    fn test_line_and_corner() {
        let t = NeighborOffsetTable::default();
        let line = [0, F, 0, 0, F, 0, 0, F, 0];
        assert_eq!(split_counts(&line, &t), (1, 2));
        // 边缘像素: 移除后剩余部分仍连通.
        let l_shape = [F, F, 0, F, F, 0, 0, 0, 0];
        assert!(!would_disconnect(&l_shape, &t));
        let diag = [F, 0, 0, 0, F, 0, 0, 0, F];
        assert!(would_disconnect(&diag, &t));
        assert_eq!(component_count(&[0; 9], &t), 0);
    }
}
