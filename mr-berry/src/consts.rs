//! 通用常量.

/// 标签值.
pub mod label {
    /// 背景 (非脑组织) 体素的标签值.
    pub const BACKGROUND: u16 = 0;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(v: u16) -> bool {
        matches!(v, BACKGROUND)
    }

    /// 体素是否是组织 (非背景)?
    #[inline]
    pub const fn is_tissue(v: u16) -> bool {
        !is_background(v)
    }
}

/// 年龄分界 (岁). 小于该值的 subject 归入 Minor.
pub const ADULT_AGE: f64 = 18.0;

/// 年龄分界 (岁). 大于等于该值的 subject 归入 Senior.
pub const SENIOR_AGE: f64 = 65.0;

/// catalog 中不存在的标签所使用的显示名.
pub const UNKNOWN_LABEL_NAME: &str = "Unknown";

/// 整脑聚合记录 ("Total brain" 伪标签) 的显示名.
pub const TOTAL_BRAIN_NAME: &str = "Total brain";

/// Tukey fence 系数. 区间为 `[Q1 - K * IQR, Q3 + K * IQR]`.
pub const TUKEY_FENCE_K: f64 = 1.5;
