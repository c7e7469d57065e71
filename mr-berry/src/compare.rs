//! 标签图一致性比较.
//!
//! 对两张共配准的 3D 标签图逐标签计算 Dice 系数与 IoU (Jaccard),
//! 并给出按第一张图体素占比加权的总 Dice. 常用于比较同一 subject 的
//! 两种融合策略 (或 atlas 配准结果) 的一致程度.
//!
//! 纯数组运算, 不产生任何 I/O.

use std::collections::BTreeMap;

use crate::{Idx3d, MrLabel, NiftiHeaderAttr};

/// 标签图比较的前置条件错误.
#[derive(Debug)]
pub enum CompareError {
    /// 两张输入图形状不一致.
    ShapeMismatch {
        /// 第一张输入图的形状.
        expect: Idx3d,

        /// 第二张输入图的形状.
        found: Idx3d,
    },
}

/// 单个标签的重叠计数.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapEntry {
    /// 标签 id.
    pub label: u16,

    /// 第一张图中该标签的体素个数.
    pub count_a: usize,

    /// 第二张图中该标签的体素个数.
    pub count_b: usize,

    /// 两张图同时为该标签的体素个数.
    pub intersection: usize,
}

impl OverlapEntry {
    /// 两张图中该标签体素的并集大小.
    #[inline]
    pub fn union(&self) -> usize {
        self.count_a + self.count_b - self.intersection
    }

    /// Dice 系数: `2|A∩B| / (|A| + |B|)`.
    ///
    /// 两张图都不含该标签时按约定为 1 (完全一致).
    pub fn dice(&self) -> f64 {
        let total = self.count_a + self.count_b;
        if total == 0 {
            return 1.0;
        }
        2.0 * self.intersection as f64 / total as f64
    }

    /// IoU (Jaccard): `|A∩B| / |A∪B|`.
    ///
    /// 两张图都不含该标签时按约定为 1 (完全一致).
    pub fn iou(&self) -> f64 {
        let union = self.union();
        if union == 0 {
            return 1.0;
        }
        self.intersection as f64 / union as f64
    }
}

/// 两张标签图的逐标签重叠报告.
///
/// 条目按标签 id 升序排列, 覆盖两张图中出现过的全部标签 (含背景).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapReport {
    entries: Vec<OverlapEntry>,
    size: usize,
}

impl OverlapReport {
    /// 比较两张共配准标签图. 形状不一致时返回 `Err` (fail fast).
    pub fn from_labels(a: &MrLabel, b: &MrLabel) -> Result<Self, CompareError> {
        let expect = a.shape();
        let found = b.shape();
        if expect != found {
            return Err(CompareError::ShapeMismatch { expect, found });
        }

        // 两张图均为标准布局 (open/fake 均保证), 可按扁平切片同步遍历.
        // 该操作不会失败, 可直接 unwrap.
        let flat_a = a.data().to_slice().unwrap();
        let flat_b = b.data().to_slice().unwrap();

        fn entry_of(counts: &mut BTreeMap<u16, OverlapEntry>, label: u16) -> &mut OverlapEntry {
            counts.entry(label).or_insert(OverlapEntry {
                label,
                count_a: 0,
                count_b: 0,
                intersection: 0,
            })
        }

        let mut counts: BTreeMap<u16, OverlapEntry> = BTreeMap::new();
        for (&va, &vb) in flat_a.iter().zip(flat_b) {
            entry_of(&mut counts, va).count_a += 1;
            entry_of(&mut counts, vb).count_b += 1;
            if va == vb {
                entry_of(&mut counts, va).intersection += 1;
            }
        }

        Ok(Self {
            entries: counts.into_values().collect(),
            size: flat_a.len(),
        })
    }

    /// 全部条目, 按标签 id 升序.
    #[inline]
    pub fn entries(&self) -> &[OverlapEntry] {
        &self.entries
    }

    /// 获取指定标签的条目. 两张图中都未出现的标签返回 `None`.
    pub fn get(&self, label: u16) -> Option<&OverlapEntry> {
        self.entries
            .binary_search_by_key(&label, |e| e.label)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// 体素总数 (单张图).
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 按第一张图体素占比加权的总 Dice:
    /// `Σ dice(label) * count_a(label) / 体素总数`.
    ///
    /// 权重覆盖全部体素 (含背景), 因此完全一致的两张图结果为 1.
    pub fn weighted_dice(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.dice() * e.count_a as f64 / self.size as f64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// 以给定扁平数据构造 [W, H, z] = [1, 1, 4] 的标签图.
    fn label_from(flat: &[u16; 4]) -> MrLabel {
        let data = Array3::from_shape_vec((1, 1, 4), flat.to_vec()).unwrap();
        MrLabel::fake(data, [1.0, 1.0, 1.0])
    }

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_identical_maps() {
        let a = label_from(&[0, 1, 1, 2]);
        let report = OverlapReport::from_labels(&a, &a.clone()).unwrap();

        for e in report.entries() {
            assert!(float_eq(e.dice(), 1.0));
            assert!(float_eq(e.iou(), 1.0));
        }
        assert!(float_eq(report.weighted_dice(), 1.0));
    }

    #[test]
    fn test_partial_overlap() {
        // label 1: |A|=2, |B|=1, 交 1 -> dice 2/3, iou 1/2.
        // label 2: |A|=1, |B|=2, 交 1 -> dice 2/3, iou 1/2.
        let a = label_from(&[1, 1, 2, 0]);
        let b = label_from(&[1, 2, 2, 0]);
        let report = OverlapReport::from_labels(&a, &b).unwrap();

        let e1 = report.get(1).unwrap();
        assert_eq!((e1.count_a, e1.count_b, e1.intersection), (2, 1, 1));
        assert_eq!(e1.union(), 2);
        assert!(float_eq(e1.dice(), 2.0 / 3.0));
        assert!(float_eq(e1.iou(), 0.5));

        let e2 = report.get(2).unwrap();
        assert!(float_eq(e2.dice(), 2.0 / 3.0));

        // 背景完全一致.
        assert!(float_eq(report.get(0).unwrap().dice(), 1.0));

        // 加权: 1 * 1/4 + 2/3 * 2/4 + 2/3 * 1/4 = 3/4.
        assert!(float_eq(report.weighted_dice(), 0.75));
    }

    #[test]
    fn test_disjoint_labels() {
        // B 中不存在 label 1, A 中不存在 label 2.
        let a = label_from(&[1, 1, 1, 1]);
        let b = label_from(&[2, 2, 2, 2]);
        let report = OverlapReport::from_labels(&a, &b).unwrap();

        let e1 = report.get(1).unwrap();
        assert_eq!((e1.count_a, e1.count_b), (4, 0));
        assert_eq!(e1.dice(), 0.0);
        assert_eq!(e1.iou(), 0.0);
        assert_eq!(report.weighted_dice(), 0.0);
        assert!(report.get(7).is_none());
    }

    #[test]
    fn test_shape_mismatch_fail_fast() {
        let a = label_from(&[0, 0, 0, 0]);
        let b = MrLabel::fake(Array3::<u16>::zeros((2, 2, 2)), [1.0, 1.0, 1.0]);
        match OverlapReport::from_labels(&a, &b) {
            Err(CompareError::ShapeMismatch { expect, found }) => {
                assert_eq!(expect, (4, 1, 1));
                assert_eq!(found, (2, 2, 2));
            }
            other => panic!("意外结果: {other:?}"),
        }
    }
}
