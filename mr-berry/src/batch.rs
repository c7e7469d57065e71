//! 目录级批处理.
//!
//! 把一个目录下的全部分割标签文件聚合为逐 subject 体积报告, 再按
//! subject 元信息扇出到 cohort 桶并结算统计. 单个文件失败 (文件名不符合
//! 命名惯例 / nifti 读取失败) 时记录 warn 日志并跳过, 不中断整批任务.
//!
//! `rayon` feature 打开时, 文件聚合阶段并行执行, 结果顺序不变.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use cfg_if::cfg_if;

use crate::aggregate::VolumeReport;
use crate::catalog::LabelCatalog;
use crate::cohort::{self, Cohort, SubjectTable};
use crate::dataset::generic::list_label_files;
use crate::stats::{CohortAccumulator, CohortStats};
use crate::MrLabel;

/// 单个 subject 的批处理产物.
#[derive(Debug, Clone)]
pub struct SubjectReport {
    /// subject id (从文件名解析).
    pub id: u32,

    /// 来源文件名.
    pub file_name: String,

    /// 体积聚合报告.
    pub report: VolumeReport,
}

/// 聚合单个标签文件. 任何失败都消化为 `None` 并留下 warn 日志.
fn aggregate_one(dir: &Path, file_name: &str, catalog: &LabelCatalog) -> Option<SubjectReport> {
    let Some(id) = cohort::resolve_subject_id(file_name) else {
        log::warn!("文件名不符合任何已注册命名惯例, 已跳过: {file_name}");
        return None;
    };

    let path = dir.join(file_name);
    let label = match MrLabel::open(&path) {
        Ok(label) => label,
        Err(e) => {
            log::warn!("标签文件读取失败, 已跳过: {}: {e}", path.display());
            return None;
        }
    };

    Some(SubjectReport {
        id,
        file_name: file_name.to_owned(),
        report: VolumeReport::from_label(&label, catalog),
    })
}

/// 聚合目录下全部标签文件 (`.nii` / `.nii.gz`), 按文件名字典序排列.
///
/// 目录不可读时返回 `Err`; 单个文件的失败只产生日志, 不进入结果.
pub fn aggregate_dir<P: AsRef<Path>>(
    dir: P,
    catalog: &LabelCatalog,
) -> io::Result<Vec<SubjectReport>> {
    let dir = dir.as_ref();
    let files = list_label_files(dir)?;

    cfg_if! {
        if #[cfg(feature = "rayon")] {
            use rayon::prelude::*;
            let ans = files
                .par_iter()
                .filter_map(|name| aggregate_one(dir, name, catalog))
                .collect();
        } else {
            let ans = files
                .iter()
                .filter_map(|name| aggregate_one(dir, name, catalog))
                .collect();
        }
    }

    Ok(ans)
}

/// 将逐 subject 报告扇出到 cohort 桶并结算统计.
///
/// 元信息表中不存在的 subject 只进入 Overall 桶.
pub fn cohort_summary(
    reports: &[SubjectReport],
    table: &SubjectTable,
    catalog: &LabelCatalog,
) -> BTreeMap<Cohort, CohortStats> {
    let mut acc = CohortAccumulator::new();
    for sr in reports {
        acc.push(&table.cohorts_of(sr.id), &sr.report);
    }
    acc.finish(catalog)
}

/// 目录聚合 + cohort 统计的一站式入口.
pub fn run<P: AsRef<Path>>(
    dir: P,
    catalog: &LabelCatalog,
    table: &SubjectTable,
) -> io::Result<BTreeMap<Cohort, CohortStats>> {
    let reports = aggregate_dir(dir, catalog)?;
    Ok(cohort_summary(&reports, table, catalog))
}
