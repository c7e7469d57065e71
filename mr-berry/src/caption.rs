//! 英文描述文本 (caption) 生成.
//!
//! 把单个 subject 的体积聚合结果渲染为一句自然语言描述, 从固定的
//! 模板库中选取句式. 句式与结构顺序的随机性通过可注入的 [`PhrasePicker`]
//! 提供, 默认实现是确定性的种子化选择器, 同一种子产出完全相同的文本.

use crate::aggregate::VolumeReport;
use crate::cohort::Sex;

/// 描述句式模板库. `{type}` / `{gender}` / `{age}` / `{structures}` /
/// `{total_volume}` 为替换占位符.
const TEMPLATES: [&str; 10] = [
    "This {type} scan captures the brain of a {gender} individual, aged {age}.\
     The structures visible include {structures}. The total brain volume is \
     approximately {total_volume} mm³.",
    "In this {type} scan of a {age}-year-old {gender}, important brain \
     structures such as {structures} are clearly visible. The brain's total \
     volume is {total_volume} mm³.",
    "{type} imaging reveals detailed {structures} in the brain of a \
     {age}-year-old {gender}. The overall brain volume is measured at \
     {total_volume} mm³.",
    "A {type} scan of a {age}-year-old {gender} highlights the following \
     brain structures: {structures}. The total brain volume is \
     {total_volume} mm³.",
    "Key brain features identified in this {type} scan of a {gender} aged \
     {age} include {structures}. The entire brain volume amounts to \
     {total_volume} mm³.",
    "For this {type} scan, the subject is a {age}-year-old {gender}, \
     showcasing {structures} in the brain. The total brain volume calculated \
     is {total_volume} mm³.",
    "This {type} imaging study shows brain structures such as {structures} \
     in a {gender} individual, aged {age}. The total brain volume is \
     approximately {total_volume} mm³.",
    "The {type} scan of this {age}-year-old {gender} reveals: {structures}. \
     The total volume of the brain is {total_volume} mm³.",
    "In this scan ({type}), the brain of a {gender} aged {age} is observed, \
     showing {structures}. The brain's total volume is {total_volume} mm³.",
    "This {type} imaging presents the brain of a {gender} subject who is \
     {age} years old, emphasizing {structures}. The total brain volume is \
     calculated to be {total_volume} mm³.",
];

/// 离散选择器. 为模板选取与结构乱序提供随机源, 便于在测试中注入确定性实现.
pub trait PhrasePicker {
    /// 从 `n` 个候选中选取一个, 返回下标 (严格小于 `n`).
    ///
    /// `n` 为零时程序 panic.
    fn pick(&mut self, n: usize) -> usize;
}

/// 恒取第一个候选的选择器.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstPicker;

impl PhrasePicker for FirstPicker {
    fn pick(&mut self, n: usize) -> usize {
        assert!(n > 0);
        0
    }
}

/// 种子化的确定性选择器 (64 位线性同余发生器).
///
/// 不提供统计学意义上的随机性, 只保证同一种子下的序列完全可复现.
#[derive(Debug, Clone)]
pub struct SeededPicker {
    state: u64,
}

impl SeededPicker {
    /// 以给定种子构造选择器.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }
}

impl PhrasePicker for SeededPicker {
    fn pick(&mut self, n: usize) -> usize {
        assert!(n > 0);
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.state >> 33) % n as u64) as usize
    }
}

/// 结构摘要的排序方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SummaryOrder {
    /// 按结构显示名字典序升序.
    ByName,

    /// 按体积降序.
    ByVolumeDesc,

    /// 由选择器决定的乱序.
    Shuffled,
}

/// 把体积聚合结果中的已知结构拼接为 `"名称 体积 mm³"` 列表.
///
/// 目录中无名的标签 (Unknown) 不进入摘要. `top` 限定保留的结构个数
/// (排序后取前 N); `None` 表示全部保留. 体积保留两位小数.
pub fn structures_summary(
    report: &VolumeReport,
    order: SummaryOrder,
    top: Option<usize>,
    picker: &mut dyn PhrasePicker,
) -> String {
    let mut entries: Vec<(&str, f64)> = report
        .entries()
        .iter()
        .filter(|e| e.known)
        .map(|e| (e.name.as_str(), e.volume_mm3))
        .collect();

    match order {
        SummaryOrder::ByName => {
            entries.sort_by(|a, b| a.0.cmp(b.0));
        }
        SummaryOrder::ByVolumeDesc => {
            entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        }
        SummaryOrder::Shuffled => {
            // Fisher-Yates, 随机源来自选择器.
            for i in (1..entries.len()).rev() {
                entries.swap(i, picker.pick(i + 1));
            }
        }
    }

    if let Some(top) = top {
        entries.truncate(top);
    }

    entries
        .iter()
        .map(|(name, volume)| format!("{name} {volume:.2} mm³"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 性别的描述用词.
pub fn sex_phrase(sex: Sex) -> &'static str {
    match sex {
        Sex::Male => "male",
        Sex::Female => "female",
        Sex::Unspecified => "unknown",
    }
}

/// caption 的 subject 侧素材.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    /// 扫描模态 (如 "T1" / "T2" / "FLAIR"),
    /// 可由 [`crate::cohort::naming_rule_of`] 查得.
    pub modality: &'a str,

    /// 性别用词, 见 [`sex_phrase`].
    pub gender: &'a str,

    /// 年龄原文. 未知时惯用 "unknown".
    pub age: &'a str,
}

/// 渲染一条完整的描述文本.
///
/// 模板由 `picker` 从模板库中选取; 总体积为聚合结果中全部非背景组织
/// 体积之和, 保留两位小数.
pub fn render(
    subject: Subject<'_>,
    structures: &str,
    total_volume: f64,
    picker: &mut dyn PhrasePicker,
) -> String {
    TEMPLATES[picker.pick(TEMPLATES.len())]
        .replace("{type}", subject.modality)
        .replace("{gender}", subject.gender)
        .replace("{age}", subject.age)
        .replace("{structures}", structures)
        .replace("{total_volume}", &format!("{total_volume:.2}"))
}
