//! cohort 鲁棒统计引擎.
//!
//! 对 cohort 内按 label 汇集的 (体积, 占比) 观测值计算均值、总体标准差、
//! 线性插值分位数、IQR 与 Tukey fence 离群值, 并按变异系数 (CoV)
//! 降序排名 — 该排名刻画各解剖结构在 cohort 内体积的相对不稳定程度,
//! 是整条流水线的首要分析输出.
//!
//! 每次运行都从观测值完整重算, 不存在任何隐藏状态, 结果可按位复现.

use std::collections::BTreeMap;

use itertools::Itertools;
use ordered_float::NotNan;

use crate::aggregate::VolumeReport;
use crate::catalog::LabelCatalog;
use crate::cohort::Cohort;
use crate::consts::{TOTAL_BRAIN_NAME, TUKEY_FENCE_K};

/// 一条观测值: (label, 体积 mm³, 占比 %).
pub type Observation = (u16, f64, f64);

/// 每条统计记录的键.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum StatKey {
    /// 普通解剖标签.
    Label(u16),

    /// "Total brain" 整脑聚合伪标签.
    TotalBrain,
}

/// 单标签体积样本的鲁棒统计记录.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LabelStats {
    /// 标签显示名.
    pub label_name: String,

    /// 体积均值 (mm³).
    #[cfg_attr(feature = "serde", serde(rename = "avg_volume (mm3)"))]
    pub avg_volume: f64,

    /// 体积总体标准差 (除以 N, 而不是 N-1).
    #[cfg_attr(feature = "serde", serde(rename = "std_volume (mm3)"))]
    pub std_volume: f64,

    /// 占比均值 (%). 整脑聚合记录恒为 100.
    #[cfg_attr(feature = "serde", serde(rename = "avg_ratio_vol_totvol (%)"))]
    pub avg_ratio: f64,

    /// 变异系数 (std / avg * 100). std 为 0 时定义为 0.
    #[cfg_attr(feature = "serde", serde(rename = "ratio_std_avg (%)"))]
    pub cov: f64,

    /// Tukey fence 内的最小体积. 若 fence 内无样本, 回退为全样本最小值.
    pub min: f64,

    /// Tukey fence 内的最大体积. 若 fence 内无样本, 回退为全样本最大值.
    pub max: f64,

    /// 第一四分位数 (线性插值).
    #[cfg_attr(feature = "serde", serde(rename = "Q1"))]
    pub q1: f64,

    /// 中位数.
    #[cfg_attr(feature = "serde", serde(rename = "Q2"))]
    pub q2: f64,

    /// 第三四分位数 (线性插值).
    #[cfg_attr(feature = "serde", serde(rename = "Q3"))]
    pub q3: f64,

    /// 四分位距 (Q3 - Q1).
    #[cfg_attr(feature = "serde", serde(rename = "IQR"))]
    pub iqr: f64,

    /// fence 外的全部体积值. 保持输入顺序, 重复值保留.
    pub outliers: Vec<f64>,
}

/// 对已升序排序的样本做线性插值百分位数计算 (numpy 的 "linear" 方式).
///
/// `sorted` 必须非空且升序, `p` 取 0..=100, 否则程序 panic.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    assert!(!sorted.is_empty());
    assert!((0.0..=100.0).contains(&p));

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// 计算体积样本的鲁棒统计记录.
///
/// `volumes` 与 `ratios` 为同一分组的体积与占比样本, 长度一致且非空,
/// 否则程序 panic. 单点样本按文档化的退化规则处理
/// (std = 0, CoV = 0, 无离群值), 不是错误.
pub fn label_stats(label_name: &str, volumes: &[f64], ratios: &[f64]) -> LabelStats {
    assert!(!volumes.is_empty());
    assert_eq!(volumes.len(), ratios.len());

    let avg_ratio = mean(ratios);
    let mut stats = volume_stats(label_name, volumes);
    stats.avg_ratio = avg_ratio;
    stats
}

/// 计算 "Total brain" 整脑聚合统计记录.
///
/// `totals` 为每个 subject 的组织总体积 (一个 subject 一个值).
/// 占比均值按定义恒为 100%. 空样本返回 `None`.
pub fn total_brain_stats(totals: &[f64]) -> Option<LabelStats> {
    if totals.is_empty() {
        return None;
    }
    let mut stats = volume_stats(TOTAL_BRAIN_NAME, totals);
    stats.avg_ratio = 100.0;
    Some(stats)
}

/// 体积样本统计的公共部分. `avg_ratio` 由调用者填充.
fn volume_stats(label_name: &str, volumes: &[f64]) -> LabelStats {
    let avg_volume = mean(volumes);
    let std_volume = pstdev(volumes, avg_volume);
    let cov = if std_volume > 0.0 {
        std_volume / avg_volume * 100.0
    } else {
        0.0
    };

    let mut sorted = volumes.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let q1 = percentile(&sorted, 25.0);
    let q2 = percentile(&sorted, 50.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;

    let fence_lo = q1 - TUKEY_FENCE_K * iqr;
    let fence_hi = q3 + TUKEY_FENCE_K * iqr;

    let mut fenced = volumes
        .iter()
        .copied()
        .filter(|v| (fence_lo..=fence_hi).contains(v));
    let (min, max) = match fenced.next() {
        Some(first) => fenced.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))),
        // fence 内无样本 (退化分布), 回退为全样本端点.
        None => (sorted[0], sorted[sorted.len() - 1]),
    };

    let outliers = volumes
        .iter()
        .copied()
        .filter(|v| *v < fence_lo || *v > fence_hi)
        .collect();

    LabelStats {
        label_name: label_name.to_owned(),
        avg_volume,
        std_volume,
        avg_ratio: 0.0,
        cov,
        min,
        max,
        q1,
        q2,
        q3,
        iqr,
        outliers,
    }
}

#[inline]
fn mean(xs: &[f64]) -> f64 {
    debug_assert!(!xs.is_empty());
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// 总体标准差 (除以 N).
#[inline]
fn pstdev(xs: &[f64], mean: f64) -> f64 {
    debug_assert!(!xs.is_empty());
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

/// 单个 cohort 的全部统计记录.
///
/// 普通标签记录按 CoV 降序排列 (CoV 相同时按标签 id 升序, 保证确定性);
/// "Total brain" 聚合记录 (若样本非空) 固定位于末尾.
#[derive(Debug, Clone, Default)]
pub struct CohortStats {
    records: Vec<(StatKey, LabelStats)>,
}

impl CohortStats {
    /// 从观测值池与每 subject 总体积样本计算 cohort 统计.
    ///
    /// 空观测值池产生空记录集, 不是错误.
    pub fn from_observations(
        observations: &[Observation],
        subject_totals: &[f64],
        catalog: &LabelCatalog,
    ) -> Self {
        let mut pooled: BTreeMap<u16, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for (label, volume, ratio) in observations {
            let (volumes, ratios) = pooled.entry(*label).or_default();
            volumes.push(*volume);
            ratios.push(*ratio);
        }

        let mut records: Vec<(StatKey, LabelStats)> = pooled
            .into_iter()
            .map(|(label, (volumes, ratios))| {
                let stats = label_stats(catalog.name_of(label), &volumes, &ratios);
                (StatKey::Label(label), stats)
            })
            .collect();

        // CoV 由非负 std / 正 mean 得出, 不可能为 NaN, 可直接 unwrap.
        records.sort_by_key(|(key, stats)| {
            (std::cmp::Reverse(NotNan::new(stats.cov).unwrap()), *key)
        });

        if let Some(total) = total_brain_stats(subject_totals) {
            records.push((StatKey::TotalBrain, total));
        }

        Self { records }
    }

    /// 全部记录, 按 CoV 降序 (整脑聚合记录在末尾).
    #[inline]
    pub fn records(&self) -> &[(StatKey, LabelStats)] {
        &self.records
    }

    /// 获取指定键对应的统计记录.
    pub fn get(&self, key: StatKey) -> Option<&LabelStats> {
        self.records
            .iter()
            .find_map(|(k, stats)| (*k == key).then_some(stats))
    }

    /// 记录条数 (含整脑聚合记录).
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 记录集是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// cohort 观测值汇集器.
///
/// 将每个 subject 的体积聚合报告扇出到其所属的全部 cohort 桶,
/// 同时记录每 subject 的组织总体积. 全部 subject 汇入后一次性结算.
#[derive(Debug, Clone, Default)]
pub struct CohortAccumulator {
    pools: BTreeMap<Cohort, Vec<Observation>>,
    totals: BTreeMap<Cohort, Vec<f64>>,
}

impl CohortAccumulator {
    /// 创建空汇集器.
    pub fn new() -> Self {
        Self::default()
    }

    /// 将一个 subject 的聚合报告汇入 `cohorts` 中的每一个桶.
    pub fn push(&mut self, cohorts: &[Cohort], report: &VolumeReport) {
        for cohort in cohorts.iter().unique() {
            self.pools
                .entry(*cohort)
                .or_default()
                .extend(report.observations());
            self.totals
                .entry(*cohort)
                .or_default()
                .push(report.total_volume());
        }
    }

    /// 已有观测值的 cohort 个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// 汇集器是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// 结算全部 cohort 的统计记录.
    pub fn finish(self, catalog: &LabelCatalog) -> BTreeMap<Cohort, CohortStats> {
        self.pools
            .into_iter()
            .map(|(cohort, observations)| {
                let totals = self.totals.get(&cohort).map_or(&[][..], Vec::as_slice);
                let stats = CohortStats::from_observations(&observations, totals, catalog);
                (cohort, stats)
            })
            .collect()
    }
}
