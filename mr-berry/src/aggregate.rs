//! 标签体素体积聚合.
//!
//! 对单个 3D 标签图统计每个出现过的 label 的体素个数, 并按体素分辨率换算为
//! 实际体积 (立方毫米) 与组织总体积占比. 纯函数, 不产生任何 I/O.

use std::collections::BTreeMap;

use crate::catalog::LabelCatalog;
use crate::consts::label::BACKGROUND;
use crate::{MrLabel, NiftiHeaderAttr};

/// 单个标签的聚合结果.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeEntry {
    /// 标签 id.
    pub label: u16,

    /// 标签显示名. 目录中不存在的标签为 "Unknown".
    pub name: String,

    /// 标签颜色. 目录中不存在的标签为全零.
    pub rgb: [u8; 3],

    /// 标签是否在目录中. 下游据此可以把未知标签单独报告出来.
    pub known: bool,

    /// 体素个数.
    pub voxel_count: usize,

    /// 实际体积, 以立方毫米为单位.
    pub volume_mm3: f64,

    /// 占组织总体积的百分比. 背景标签恒为 0.
    pub ratio: f64,
}

/// 单个标签图的体积聚合报告.
///
/// 条目按标签 id 升序排列. 只包含图中实际出现过的标签.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeReport {
    entries: Vec<VolumeEntry>,
    total_volume: f64,
}

impl VolumeReport {
    /// 对一张标签图做聚合. 体素体积取自标注自身的分辨率信息.
    pub fn from_label(label: &MrLabel, catalog: &LabelCatalog) -> Self {
        Self::from_counts(&label.label_counts(), label.voxel(), catalog)
    }

    /// 从已有的标签计数表聚合. `voxel_mm3` 为单个体素的实际体积, 必须为正.
    pub fn from_counts(
        counts: &BTreeMap<u16, usize>,
        voxel_mm3: f64,
        catalog: &LabelCatalog,
    ) -> Self {
        assert!(voxel_mm3 > 0.0);

        // 组织总体积不计入背景.
        let total_volume: f64 = counts
            .iter()
            .filter(|(label, _)| **label != BACKGROUND)
            .map(|(_, count)| *count as f64 * voxel_mm3)
            .sum();

        let entries = counts
            .iter()
            .map(|(&label, &voxel_count)| {
                let volume_mm3 = voxel_count as f64 * voxel_mm3;
                // 退化图像 (总体积为 0) 时占比一律定义为 0, 不产生除零.
                let ratio = if label == BACKGROUND || total_volume == 0.0 {
                    0.0
                } else {
                    volume_mm3 / total_volume * 100.0
                };
                VolumeEntry {
                    label,
                    name: catalog.name_of(label).to_owned(),
                    rgb: catalog.rgb_of(label),
                    known: catalog.contains(label),
                    voxel_count,
                    volume_mm3,
                    ratio,
                }
            })
            .collect();

        Self {
            entries,
            total_volume,
        }
    }

    /// 组织总体积 (立方毫米), 不含背景.
    #[inline]
    pub fn total_volume(&self) -> f64 {
        self.total_volume
    }

    /// 全部条目, 按标签 id 升序.
    #[inline]
    pub fn entries(&self) -> &[VolumeEntry] {
        &self.entries
    }

    /// 获取指定标签的条目. 图中未出现的标签返回 `None`.
    pub fn get(&self, label: u16) -> Option<&VolumeEntry> {
        self.entries
            .binary_search_by_key(&label, |e| e.label)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// 迭代非背景标签的 (label, 体积, 占比) 观测值, 供 cohort 统计汇集.
    pub fn observations(&self) -> impl Iterator<Item = (u16, f64, f64)> + '_ {
        self.entries
            .iter()
            .filter(|e| e.label != BACKGROUND)
            .map(|e| (e.label, e.volume_mm3, e.ratio))
    }

    /// 是否存在目录中不认识的标签?
    pub fn has_unknown(&self) -> bool {
        self.entries.iter().any(|e| !e.known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LabelCatalog;
    use ndarray::Array3;
    use std::io::Cursor;

    fn gm_wm_catalog() -> LabelCatalog {
        let src = "ID,Labels,RGB\n1,GM,\"(1, 2, 3)\"\n2,WM,\"(4, 5, 6)\"\n";
        LabelCatalog::from_reader(Cursor::new(src)).unwrap()
    }

    /// 100 体素 label 1, 50 体素 label 2, 10 体素背景.
    fn sample_label() -> MrLabel {
        let mut data = Array3::<u16>::zeros((4, 5, 8)); // 160 体素
        let flat = data.as_slice_mut().unwrap();
        for v in flat.iter_mut().take(100) {
            *v = 1;
        }
        for v in flat.iter_mut().skip(100).take(50) {
            *v = 2;
        }
        MrLabel::fake(data, [1.0, 1.0, 1.0])
    }

    #[test]
    fn test_scenario_volumes_and_ratios() {
        let report = VolumeReport::from_label(&sample_label(), &gm_wm_catalog());
        assert!((report.total_volume() - 150.0).abs() < 1e-9);

        let e1 = report.get(1).unwrap();
        assert_eq!(e1.voxel_count, 100);
        assert!((e1.volume_mm3 - 100.0).abs() < 1e-9);
        assert!((e1.ratio - 200.0 / 3.0).abs() < 1e-9); // 66.67%

        let e2 = report.get(2).unwrap();
        assert!((e2.volume_mm3 - 50.0).abs() < 1e-9);
        assert!((e2.ratio - 100.0 / 3.0).abs() < 1e-9); // 33.33%

        let e0 = report.get(0).unwrap();
        assert_eq!(e0.voxel_count, 10);
        assert!((e0.volume_mm3 - 10.0).abs() < 1e-9);
        assert_eq!(e0.ratio, 0.0);
    }

    #[test]
    fn test_total_equals_nonbackground_sum() {
        let report = VolumeReport::from_label(&sample_label(), &gm_wm_catalog());
        let sum: f64 = report
            .entries()
            .iter()
            .filter(|e| e.label != 0)
            .map(|e| e.volume_mm3)
            .sum();
        assert!((sum - report.total_volume()).abs() < 1e-9);

        let ratio_sum: f64 = report.observations().map(|(_, _, r)| r).sum();
        assert!((ratio_sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_all_background() {
        let data = Array3::<u16>::zeros((2, 2, 2));
        let label = MrLabel::fake(data, [1.0, 1.0, 1.0]);
        let report = VolumeReport::from_label(&label, &gm_wm_catalog());
        assert_eq!(report.total_volume(), 0.0);
        assert_eq!(report.get(0).unwrap().ratio, 0.0);
        assert_eq!(report.observations().count(), 0);
    }

    #[test]
    fn test_unknown_label_retained() {
        let mut data = Array3::<u16>::zeros((2, 2, 2));
        data[(0, 0, 0)] = 9;
        let label = MrLabel::fake(data, [1.0, 1.0, 1.0]);
        let report = VolumeReport::from_label(&label, &gm_wm_catalog());

        let e = report.get(9).unwrap();
        assert!(!e.known);
        assert_eq!(e.name, "Unknown");
        assert_eq!(e.rgb, [0, 0, 0]);
        assert!((e.ratio - 100.0).abs() < 1e-9);
        assert!(report.has_unknown());
    }

    #[test]
    fn test_anisotropic_voxel() {
        let mut data = Array3::<u16>::zeros((2, 2, 2));
        data[(0, 0, 0)] = 1;
        let label = MrLabel::fake(data, [0.5, 0.5, 2.0]);
        let report = VolumeReport::from_label(&label, &gm_wm_catalog());
        assert!((report.get(1).unwrap().volume_mm3 - 0.5).abs() < 1e-9);
    }
}
