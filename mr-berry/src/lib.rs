#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供脑部 MRI 多图谱分割标签文件 (nifti 格式) 的结构化信息、
//! 体素体积聚合、cohort 鲁棒统计与多数投票标签融合算法.
//!
//! 该 crate 目前仅提供 `safe` 接口. 将来可能为部分高性能场景关键路径提供 `unsafe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 主要面向 IBSR / OASIS / Kirby (KKI) / IXI 模式组织的分割标签数据,
//!   没有对其它源的数据进行直接适配
//!   (但如果新数据按照同样模式进行组织, 也可以工作).
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 开发计划
//!
//! ### 标签体素体积聚合 ✅
//!
//! 对单个 3D 标签图统计每个 label 的体素个数, 并按照体素分辨率换算为实际体积
//! (立方毫米) 与组织总体积占比.
//!
//! 实现位于 `mr-berry/src/aggregate.rs`.
//!
//! ### 解剖标签目录 ✅
//!
//! 从分隔文件加载 `label id -> (名称, RGB)` 映射. 未知标签不丢弃,
//! 统一以 "Unknown" 名称保留.
//!
//! 实现位于 `mr-berry/src/catalog.rs`.
//!
//! ### cohort 划分 ✅
//!
//! 按性别与年龄段将 subject 分配到若干可重叠的桶 (Male/Female,
//! Minor/Adult/Senior, Overall). 同时提供按数据集命名惯例解析
//! subject id 的规则表.
//!
//! 实现位于 `mr-berry/src/cohort.rs`.
//!
//! ### 鲁棒统计引擎 ✅
//!
//! 对 cohort 内按 label 汇集的体积样本计算均值、总体标准差、线性插值分位数、
//! IQR 与 Tukey fence 离群值, 并按变异系数降序排名. 另含 "Total brain"
//! 整脑聚合记录.
//!
//! 实现位于 `mr-berry/src/stats.rs`.
//!
//! ### 多数投票标签融合 ✅
//!
//! 对 N 张共配准标签图做逐体素 plurality 投票, 平票体素标记为 sentinel,
//! 再通过三维精确欧氏距离变换用最近有效标签修复.
//!
//! 实现位于 `mr-berry/src/fuse`.
//!
//! ### 标签图一致性比较 ✅
//!
//! 对两张共配准标签图逐标签计算 Dice 与 IoU, 以及按第一张图体素占比
//! 加权的总 Dice.
//!
//! 实现位于 `mr-berry/src/compare.rs`.
//!
//! ### 报告输出 ✅
//!
//! 单 subject 体积 CSV 报告与 cohort 统计 JSON 报告 (后者需要 `serde` feature).
//!
//! 实现位于 `mr-berry/src/report.rs`.
//!
//! ### 切片导出与 caption 模板 ✅
//!
//! 水平切片的 PNG 导出 (原样灰度 / catalog 着色), 以及可注入选择器的
//! 英文描述文本生成.
//!
//! 实现位于 `mr-berry/src/data/slice.rs` 和 `mr-berry/src/caption.rs`.
//!
//! ### 批处理 ✅
//!
//! 目录级批量聚合与 cohort 汇总. 单个文件失败时记录日志并跳过,
//! 不中断整批任务. `rayon` feature 打开时并行执行.
//!
//! 实现位于 `mr-berry/src/batch.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 压缩存储优化时会用到. 该结构不对外公开.
type Idx3dU16 = (u16, u16, u16);

type Predicate = fn(u16) -> bool;

/// 3D 标签图 nii 文件基础数据结构.
mod data;

pub use data::{ImgWriteRaw, ImgWriteVis, LabelSlice, MrLabel, NiftiHeaderAttr};

pub mod consts;

pub mod aggregate;
pub mod batch;
pub mod caption;
pub mod catalog;
pub mod cohort;
pub mod compare;
pub mod fuse;
pub mod report;
pub mod stats;

pub mod dataset;
pub mod prelude;

mod table;
