use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::label::*;
use crate::{Idx2d, Idx3d, Predicate};

pub mod slice;

pub use slice::{ImgWriteRaw, ImgWriteVis, LabelSlice};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D 标签 nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// nii 格式 3D 脑部分割标注, 包括 header 和标签数据. 标签值以 `u16` 保存.
#[derive(Debug, Clone)]
pub struct MrLabel {
    header: BoxedHeader,
    data: Array3<u16>,
}

impl NiftiHeaderAttr for MrLabel {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MrLabel {
    type Output = u16;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MrLabel {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl MrLabel {
    /// 打开 nii (或 nii.gz) 文件格式的 3D 分割标注. `path` 为文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray::<u16>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<u16>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 将标注保存为 nii / nii.gz 文件 (由 `path` 后缀决定).
    /// header 中的物理空间信息 (体素分辨率, 方向) 会原样写出.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // (z, H, W) -> [W, H, z]. 与 `open` 的轴变换互逆.
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)
    }

    /// 根据裸标签数据和部分元信息直接创建 `MrLabel` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 nifti 惯用标准以 \[W, H, z\] 格式存储.
    /// 2. `pix_dim` 按照 \[w, h, z\] 格式存储, 单位毫米, 必须为正.
    ///
    /// # 注意
    ///
    /// 该方法创建的实体 header 仅含形状与分辨率信息,
    /// 因此你应仅将其用于实验目的.
    pub fn fake(data: Array3<u16>, pix_dim: [f32; 3]) -> Self {
        assert!(pix_dim.iter().all(|d| *d > 0.0));

        let (w, h, z) = data.dim();
        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert!(data.is_standard_layout());

        let mut header = Box::<NiftiHeader>::default();
        header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
        let [_, pw, ph, pz, ..] = &mut header.pixdim;
        let [fw, fh, fz] = &pix_dim;
        (*pw, *ph, *pz) = (*fw, *fh, *fz);
        header.intent_name[..4].copy_from_slice(b"fake");

        Self { header, data }
    }

    /// 直接创建数据. `data` 按照 \[W, H, z\] 组织,
    /// 形状必须与 `header` 声明的一致, 否则程序 panic.
    pub fn fake_with_header(header: &NiftiHeader, data: Array3<u16>) -> Self {
        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert!(data.is_standard_layout());

        let mut header = Box::new(header.clone());
        header.intent_name[..4].copy_from_slice(b"fake");
        assert_eq!(get_shape_from_header(&header), data.dim());
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake_*` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 以 (z, H, W) 布局的数据和给定 header 直接构造. crate 内部使用,
    /// 调用者保证形状一致.
    pub(crate) fn from_zhw(header: &NiftiHeader, data: Array3<u16>) -> Self {
        debug_assert_eq!(get_shape_from_header(header), data.dim());
        Self {
            header: Box::new(header.clone()),
            data,
        }
    }

    /// 获取 3D 标注 z 空间的第 `z_index` 层不可变切片.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> LabelSlice {
        LabelSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代 3D 标注水平不可变切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = LabelSlice> {
        self.data.axis_iter(Axis(0)).map(LabelSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u16, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u16, Ix3> {
        self.data.view_mut()
    }

    /// 获取 3D 标注中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u16) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 统计每个出现过的标签值的体素个数, 按标签升序返回.
    pub fn label_counts(&self) -> BTreeMap<u16, usize> {
        let mut counts = BTreeMap::new();
        for v in self.data.iter() {
            *counts.entry(*v).or_insert(0usize) += 1;
        }
        counts
    }

    /// 获取标注中出现过的全部标签值, 按升序返回.
    #[inline]
    pub fn distinct_labels(&self) -> Vec<u16> {
        self.label_counts().into_keys().collect()
    }

    /// 获取标注中出现的最大标签值. 数据为空时返回 `None`.
    #[inline]
    pub fn max_label(&self) -> Option<u16> {
        self.data.iter().copied().max()
    }

    /// 标注是否不包含任何组织体素 (全为背景)?
    #[inline]
    pub fn is_all_background(&self) -> bool {
        self.data.iter().all(|v| is_background(*v))
    }

    /// 将 3D 标注中值为 `old` 的体素全部替换为 `new`.
    ///
    /// 返回总共成功替换的个数.
    pub fn replace(&mut self, old: u16, new: u16) -> usize {
        let mut cnt = 0usize;
        self.data_mut()
            .iter_mut()
            .filter(|pix| **pix == old)
            .for_each(|p| {
                cnt += 1;
                *p = new;
            });
        cnt
    }

    /// 收集满足谓词 `pred` 的所有体素对应的下标, 结果按行优先存储.
    pub fn filter_pos(&self, pred: Predicate) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(ref pos, pixel)| pred(*pixel).then_some(*pos))
            .collect()
    }

    /// 收集所有组织 (非背景) 体素对应的下标. 结果按行优先存储.
    #[inline]
    pub fn tissue_pos(&self) -> Vec<Idx3d> {
        self.filter_pos(is_tissue)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl MrLabel {
    /// 借助 `rayon`, 并行地对 3D 标注每个水平不可变切片实施 `op` 操作.
    pub fn par_for_each_slice<F>(&self, op: F)
    where
        F: Fn(LabelSlice) + Sync + Send,
    {
        self.data()
            .axis_iter(Axis(0))
            .into_par_iter()
            .for_each(|v| {
                op(LabelSlice::new(v));
            });
    }

    /// 借助 `rayon`, 并行地对 3D 标注每个水平不可变切片实施 `op` 操作.
    /// 该操作会同时携带 z 方向索引信息.
    pub fn par_for_each_indexed_slice<F>(&self, op: F)
    where
        F: Fn(usize, LabelSlice) + Sync + Send,
    {
        self.data()
            .axis_iter(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, v)| {
                op(i, LabelSlice::new(v));
            });
    }

    /// 借助 `rayon`, 并行统计每个出现过的标签值的体素个数.
    ///
    /// 与 [`Self::label_counts`] 结果一致.
    pub fn par_label_counts(&self) -> BTreeMap<u16, usize> {
        self.data()
            .axis_iter(Axis(0))
            .into_par_iter()
            .fold(BTreeMap::new, |mut acc, sli| {
                for v in sli.iter() {
                    *acc.entry(*v).or_insert(0usize) += 1;
                }
                acc
            })
            .reduce(BTreeMap::new, |mut a, b| {
                for (k, v) in b {
                    *a.entry(k).or_insert(0) += v;
                }
                a
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn tiny_label() -> MrLabel {
        // [W, H, z] = [4, 3, 2]
        let mut data = Array3::<u16>::zeros((4, 3, 2));
        data[(0, 0, 0)] = 1;
        data[(1, 0, 0)] = 1;
        data[(2, 1, 1)] = 5;
        MrLabel::fake(data, [1.0, 1.0, 2.0])
    }

    #[test]
    fn test_fake_shape_and_voxel() {
        let label = tiny_label();
        assert!(label.is_faked());
        // (z, H, W)
        assert_eq!(label.shape(), (2, 3, 4));
        assert_eq!(label.slice_shape(), (3, 4));
        assert_eq!(label.size(), 24);
        assert!((label.voxel() - 2.0).abs() < 1e-9);
        assert!(!label.is_isotropic());
    }

    #[test]
    fn test_label_counts() {
        let label = tiny_label();
        let counts = label.label_counts();
        assert_eq!(counts[&0], 21);
        assert_eq!(counts[&1], 2);
        assert_eq!(counts[&5], 1);
        assert_eq!(label.count(5), 1);
        assert_eq!(label.distinct_labels(), vec![0, 1, 5]);
        assert_eq!(label.max_label(), Some(5));
        assert!(!label.is_all_background());
    }

    #[test]
    fn test_replace_and_filter() {
        let mut label = tiny_label();
        assert_eq!(label.replace(1, 7), 2);
        assert_eq!(label.count(1), 0);
        assert_eq!(label.count(7), 2);
        assert_eq!(label.tissue_pos().len(), 3);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_label_counts_consistent() {
        let label = tiny_label();
        assert_eq!(label.par_label_counts(), label.label_counts());
    }
}
