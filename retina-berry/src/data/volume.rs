//! 三维体数据 `(z, h, w)` 与边界延拓.

use crate::consts::gray::is_voxel_foreground;
use crate::Idx3d;
use ndarray::{s, Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis};
use ndarray_npy::{read_npy, write_npy, ReadNpyError, WriteNpyError};
use num::{One, Zero};
use std::ops::{Index, IndexMut};
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 越界访问时的边界延拓方式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BorderMode {
    /// 越界读取 0.
    #[default]
    Zero,

    /// 越界读取 1.
    One,

    /// 以边缘为轴镜像, 边缘本身不重复. 例如 `-k -> k`.
    Mirrored,

    /// 周期延拓.
    Periodic,

    /// 重复最近的边缘值.
    LastRepeated,
}

impl BorderMode {
    /// 将一维坐标 `i` 映射到 `[0, len)`.
    ///
    /// # 返回值
    ///
    /// 对于 `Zero` 和 `One`, 越界时返回 `None`, 由调用者填充常数;
    /// 其他模式总是返回 `Some`. `len == 0` 时总是返回 `None`.
    pub fn resolve(self, i: isize, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let n = len as isize;
        if (0..n).contains(&i) {
            return Some(i as usize);
        }
        match self {
            BorderMode::Zero | BorderMode::One => None,
            BorderMode::Mirrored => {
                if n == 1 {
                    return Some(0);
                }
                let period = 2 * (n - 1);
                let m = i.rem_euclid(period);
                Some(if m < n { m } else { period - m } as usize)
            }
            BorderMode::Periodic => Some(i.rem_euclid(n) as usize),
            BorderMode::LastRepeated => Some(i.clamp(0, n - 1) as usize),
        }
    }
}

/// 三维体数据六个面上的边界宽度.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Border3 {
    /// z 方向 (前, 后).
    pub z: (usize, usize),

    /// h 方向 (上, 下).
    pub h: (usize, usize),

    /// w 方向 (左, 右).
    pub w: (usize, usize),
}

impl Border3 {
    /// 六个面宽度相同的边界.
    #[inline]
    pub const fn uniform(n: usize) -> Self {
        Self {
            z: (n, n),
            h: (n, n),
            w: (n, n),
        }
    }
}

/// 三维体数据. 体素按 `(z, h, w)` 索引, 即 (切片, 行, 列).
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    data: Array3<T>,
    mode: BorderMode,
}

impl<T> Index<Idx3d> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl<T> IndexMut<Idx3d> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl<T: Copy + Zero + One> Volume<T> {
    /// 直接由底层数组初始化, 边界模式为 `BorderMode::Zero`.
    #[inline]
    pub fn new(data: Array3<T>) -> Self {
        Self {
            data,
            mode: BorderMode::Zero,
        }
    }

    /// 全 0 体数据.
    #[inline]
    pub fn zeros(shape: Idx3d) -> Self {
        Self::new(Array3::from_elem(shape, T::zero()))
    }

    /// 修改边界模式.
    #[inline]
    pub fn with_border_mode(mut self, mode: BorderMode) -> Self {
        self.mode = mode;
        self
    }

    /// 当前边界模式.
    #[inline]
    pub fn border_mode(&self) -> BorderMode {
        self.mode
    }

    /// 体数据形状 `(z, h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 体素总数, 恒等于三个维度之积.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否不含任何体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 底层数据的不可变视图.
    #[inline]
    pub fn view(&self) -> ArrayView3<T> {
        self.data.view()
    }

    /// 底层数据的可变视图.
    #[inline]
    pub fn view_mut(&mut self) -> ArrayViewMut3<T> {
        self.data.view_mut()
    }

    /// 第 `z` 个水平 (轴向) 切片.
    #[inline]
    pub fn slice_z(&self, z: usize) -> ArrayView2<T> {
        self.data.index_axis(Axis(0), z)
    }

    /// 直接获得内部数据的所有权.
    #[inline]
    pub fn into_raw(self) -> Array3<T> {
        self.data
    }

    /// 获取给定位置的体素值. 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<&T> {
        self.data.get(pos)
    }

    /// 按边界模式读取任意 (可能越界的) 位置.
    pub fn get_bordered(&self, (z, h, w): (isize, isize, isize)) -> T {
        let (zl, hl, wl) = self.shape();
        let resolved = self.mode.resolve(z, zl).and_then(|z| {
            let h = self.mode.resolve(h, hl)?;
            let w = self.mode.resolve(w, wl)?;
            Some((z, h, w))
        });
        match (resolved, self.mode) {
            (Some(p), _) => self.data[p],
            (None, BorderMode::One) => T::one(),
            (None, _) => T::zero(),
        }
    }

    /// 在六个面上各加宽 `border`, 新增区域按边界模式填充.
    pub fn pad(&self, border: Border3) -> Volume<T> {
        let (zl, hl, wl) = self.shape();
        let shape = (
            zl + border.z.0 + border.z.1,
            hl + border.h.0 + border.h.1,
            wl + border.w.0 + border.w.1,
        );
        let data = Array3::from_shape_fn(shape, |(z, h, w)| {
            self.get_bordered((
                z as isize - border.z.0 as isize,
                h as isize - border.h.0 as isize,
                w as isize - border.w.0 as isize,
            ))
        });
        Volume { data, mode: self.mode }
    }

    /// `pad` 的逆操作.
    ///
    /// # 注意
    ///
    /// 若 `border` 大于体数据本身, 则程序 panic.
    pub fn crop(&self, border: Border3) -> Volume<T> {
        let (zl, hl, wl) = self.shape();
        let view = self.data.slice(s![
            border.z.0..zl - border.z.1,
            border.h.0..hl - border.h.1,
            border.w.0..wl - border.w.1
        ]);
        Volume {
            data: view.to_owned(),
            mode: self.mode,
        }
    }
}

impl Volume<u8> {
    /// 从 `.npy` 文件读取 `u8` 体数据.
    pub fn open_npy<P: AsRef<Path>>(path: P) -> Result<Self, ReadNpyError> {
        let data: Array3<u8> = read_npy(path)?;
        Ok(Self::new(data))
    }

    /// 保存为 `.npy` 文件.
    pub fn save_npy<P: AsRef<Path>>(&self, path: P) -> Result<(), WriteNpyError> {
        write_npy(path, &self.data)
    }

    /// 前景 (含已确认) 体素个数.
    #[inline]
    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&v| is_voxel_foreground(v)).count()
    }

    /// 沿 `axis` 的第 `index` 个切片是否不含前景.
    pub fn is_slice_empty(&self, axis: Axis, index: usize) -> bool {
        !self
            .data
            .index_axis(axis, index)
            .iter()
            .any(|&v| is_voxel_foreground(v))
    }
}
