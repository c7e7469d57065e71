//! 标签图的水平切片视图与持久化存储.
//!
//! 切片可以按两种模式保存为 PNG:
//! 原样 16-bit 灰度 ([`ImgWriteRaw`]), 或按标签目录着色的
//! RGB 可视化图 ([`ImgWriteVis`]).

use std::path::Path;

use image::{ImageBuffer, ImageResult, Luma, Rgb, RgbImage};
use ndarray::{iter::IndexedIter, ArrayView2, Ix2};

use crate::catalog::LabelCatalog;
use crate::Idx2d;

/// 标签图单张水平切片的不可变视图.
#[derive(Debug, Clone, Copy)]
pub struct LabelSlice<'a> {
    view: ArrayView2<'a, u16>,
}

impl<'a> LabelSlice<'a> {
    /// 从二维视图直接构造.
    #[inline]
    pub fn new(view: ArrayView2<'a, u16>) -> Self {
        Self { view }
    }

    /// 获取切片形状 (H, W).
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.view.dim()
    }

    /// 按行优先序迭代 (索引, 标签值).
    #[inline]
    pub fn indexed_iter(&self) -> IndexedIter<'_, u16, Ix2> {
        self.view.indexed_iter()
    }

    /// 获取切片中值为 `label` 的像素个数.
    #[inline]
    pub fn count(&self, label: u16) -> usize {
        self.view.iter().filter(|p| **p == label).count()
    }

    /// 切片是否全为背景?
    #[inline]
    pub fn is_background(&self) -> bool {
        self.view.iter().all(|p| crate::consts::label::is_background(*p))
    }
}

/// 表明一个可以通过 **按原样** 模式持久化存储的图像对象.
///
/// 标签值按原样写入单通道 16-bit 灰度图, 不做任何缩放.
pub trait ImgWriteRaw {
    /// 按原样将图片保存到 `path` 路径.
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()>;
}

/// 表明一个可以通过 **可视化友好** 模式持久化存储的图像对象.
///
/// 每个标签像素按标签目录给出的 RGB 颜色着色;
/// 目录中不存在的标签以全零颜色 (黑) 渲染.
pub trait ImgWriteVis {
    /// 按照目录颜色将图片保存到 `path` 路径.
    fn save_vis<P: AsRef<Path>>(&self, path: P, catalog: &LabelCatalog) -> ImageResult<()>;
}

impl ImgWriteRaw for LabelSlice<'_> {
    fn save_raw<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::new(width as u32, height as u32);
        for ((h, w), &pix) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, Luma([pix]));
        }
        buf.save(path)
    }
}

impl ImgWriteVis for LabelSlice<'_> {
    fn save_vis<P: AsRef<Path>>(&self, path: P, catalog: &LabelCatalog) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = RgbImage::new(width as u32, height as u32);
        for ((h, w), &pix) in self.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, Rgb(catalog.rgb_of(pix)));
        }
        buf.save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_slice_basic() {
        let mut data = Array2::<u16>::zeros((3, 5));
        data[(1, 2)] = 4;
        data[(2, 4)] = 4;
        let sli = LabelSlice::new(data.view());
        assert_eq!(sli.shape(), (3, 5));
        assert_eq!(sli.count(4), 2);
        assert!(!sli.is_background());

        let empty = Array2::<u16>::zeros((2, 2));
        assert!(LabelSlice::new(empty.view()).is_background());
    }
}
