//! subject 元信息表与 cohort 划分.
//!
//! 从 `ID, GENDER, AGE` 三列的分隔文件加载 subject 元信息, 并据此将每个
//! subject 分配到若干 **可重叠** 的 cohort 桶: 性别桶 (Male/Female),
//! 年龄段桶 (Minor/Adult/Senior), 以及所有 subject 都属于的 Overall 桶.
//!
//! 另提供按数据集文件命名惯例解析 subject id 的规则表 (OAS / IBSR / KKI / IXI).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use once_cell::sync::Lazy;

use crate::consts::{ADULT_AGE, SENIOR_AGE};
use crate::table::{column_index, split_fields};

/// 性别代码.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Sex {
    /// "M".
    Male,

    /// "F".
    Female,

    /// 其他值或缺失. 不参与任何性别桶.
    Unspecified,
}

impl Sex {
    /// 从表格字段解析性别代码.
    pub fn from_field(field: &str) -> Sex {
        match field.trim() {
            "M" => Sex::Male,
            "F" => Sex::Female,
            _ => Sex::Unspecified,
        }
    }
}

/// 年龄段.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AgeBand {
    /// 不满 18 岁.
    Minor,

    /// 18 岁以上, 不满 65 岁.
    Adult,

    /// 65 岁及以上.
    Senior,

    /// 年龄字段无数字 (如 "JUV" 或空). 不参与任何年龄桶.
    Unknown,
}

impl AgeBand {
    /// 从表格字段解析年龄段.
    ///
    /// 字段中不含任何数字字符时为 `Unknown`.
    /// 允许逗号作为小数分隔符 (如 `"74,5"`).
    pub fn from_field(field: &str) -> AgeBand {
        let field = field.trim();
        if !field.chars().any(|c| c.is_ascii_digit()) {
            return AgeBand::Unknown;
        }
        let Ok(age) = field.replace(',', ".").parse::<f64>() else {
            return AgeBand::Unknown;
        };
        if age < ADULT_AGE {
            AgeBand::Minor
        } else if age < SENIOR_AGE {
            AgeBand::Adult
        } else {
            AgeBand::Senior
        }
    }
}

/// cohort 桶.
///
/// 各桶相互独立, 一个 subject 可以同时属于多个桶 (如 Male + Senior + Overall).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Cohort {
    /// 男性 subject.
    Male,

    /// 女性 subject.
    Female,

    /// 不满 18 岁的 subject.
    Minor,

    /// 18 岁以上, 不满 65 岁的 subject.
    Adult,

    /// 65 岁及以上的 subject.
    Senior,

    /// 全部 subject.
    Overall,
}

impl Cohort {
    /// 全部 cohort 桶.
    pub const ALL: [Cohort; 6] = [
        Cohort::Male,
        Cohort::Female,
        Cohort::Minor,
        Cohort::Adult,
        Cohort::Senior,
        Cohort::Overall,
    ];

    /// cohort 名称, 用于报告文件命名与 "Group" 字段.
    pub fn name(&self) -> &'static str {
        match self {
            Cohort::Male => "Male",
            Cohort::Female => "Female",
            Cohort::Minor => "Minor",
            Cohort::Adult => "Adult",
            Cohort::Senior => "Senior",
            Cohort::Overall => "Overall",
        }
    }
}

/// 单个 subject 的元信息.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SubjectInfo {
    /// 性别.
    pub sex: Sex,

    /// 年龄段.
    pub age_band: AgeBand,
}

/// 加载 subject 元信息表时的错误.
#[derive(Debug)]
pub enum SubjectTableError {
    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// 文件为空, 没有表头行.
    MissingHeader,

    /// 表头中缺少必要列. 参数为列名.
    MissingColumn(&'static str),
}

impl From<std::io::Error> for SubjectTableError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// subject 元信息表. 加载一次, 运行期间只读.
///
/// id 畸形 (非数字) 的行在加载时记录 warn 日志并跳过, 不中止整表加载 —
/// 各数据源对该情况的处理不一致, 本库统一选择容错继续.
#[derive(Debug, Clone, Default)]
pub struct SubjectTable {
    rows: BTreeMap<u32, SubjectInfo>,
}

impl SubjectTable {
    /// 从本地路径打开元信息表.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SubjectTableError> {
        Self::from_reader(BufReader::new(File::open(path.as_ref())?))
    }

    /// 从任意 `BufRead` 加载元信息表.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, SubjectTableError> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => split_fields(&line?),
            None => return Err(SubjectTableError::MissingHeader),
        };

        let id_col = column_index(&header, "ID").ok_or(SubjectTableError::MissingColumn("ID"))?;
        let sex_col =
            column_index(&header, "GENDER").ok_or(SubjectTableError::MissingColumn("GENDER"))?;
        let age_col =
            column_index(&header, "AGE").ok_or(SubjectTableError::MissingColumn("AGE"))?;

        let mut rows = BTreeMap::new();
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let line_no = line_no + 2;
            let fields = split_fields(&line);

            let raw_id = fields.get(id_col).map(String::as_str).unwrap_or("");
            // 解析同时消化前导零 ("0023" -> 23).
            let Ok(id) = raw_id.trim().parse::<u32>() else {
                log::warn!("subject 表第 {line_no} 行 id 畸形, 已跳过: {raw_id:?}");
                continue;
            };

            let sex = Sex::from_field(fields.get(sex_col).map(String::as_str).unwrap_or(""));
            let age_band =
                AgeBand::from_field(fields.get(age_col).map(String::as_str).unwrap_or(""));

            rows.insert(id, SubjectInfo { sex, age_band });
        }

        Ok(Self { rows })
    }

    /// 获取 subject 元信息. 表中不存在时返回 `None`.
    #[inline]
    pub fn get(&self, id: u32) -> Option<&SubjectInfo> {
        self.rows.get(&id)
    }

    /// 表内 subject 个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 表是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 获取 subject 所属的全部 cohort 桶.
    ///
    /// 任何 subject (包括表中不存在的) 都属于 Overall.
    /// 性别与年龄段未知时不进入对应的桶.
    pub fn cohorts_of(&self, id: u32) -> Vec<Cohort> {
        let mut ans = Vec::with_capacity(3);
        if let Some(info) = self.get(id) {
            match info.sex {
                Sex::Male => ans.push(Cohort::Male),
                Sex::Female => ans.push(Cohort::Female),
                Sex::Unspecified => {}
            }
            match info.age_band {
                AgeBand::Minor => ans.push(Cohort::Minor),
                AgeBand::Adult => ans.push(Cohort::Adult),
                AgeBand::Senior => ans.push(Cohort::Senior),
                AgeBand::Unknown => {}
            }
        }
        ans.push(Cohort::Overall);
        ans
    }
}

/// 数据集文件命名惯例: 文件名前缀 + subject id 提取规则.
pub struct NamingRule {
    /// 命中该规则的文件名前缀.
    pub prefix: &'static str,

    /// 数据集扫描模态 (caption 用).
    pub modality: &'static str,

    parse: fn(&str) -> Option<u32>,
}

/// 取第 `n` 个 `sep` 分隔段并解析为整数.
fn nth_segment(name: &str, sep: char, n: usize) -> Option<u32> {
    name.split(sep).nth(n)?.trim().parse().ok()
}

/// 已注册的命名规则表. 新数据集在此登记, 而不是在调用处做级联字符串判断.
static NAMING_RULES: Lazy<Vec<NamingRule>> = Lazy::new(|| {
    vec![
        NamingRule {
            // "OAS1_0001_MR1_..." -> 1
            prefix: "OAS",
            modality: "T1",
            parse: |name| nth_segment(name, '_', 1),
        },
        NamingRule {
            // "IBSR_01_seg.nii.gz" -> 1
            prefix: "IBSR",
            modality: "T1",
            parse: |name| nth_segment(name, '_', 1),
        },
        NamingRule {
            // "KKI2009-01-FLAIR.nii.gz" -> 1
            prefix: "KKI",
            modality: "FLAIR",
            parse: |name| nth_segment(name, '-', 1),
        },
        NamingRule {
            // "IXI002-Guys-0828-..." -> 2
            prefix: "IXI",
            modality: "T2",
            parse: |name| name.split('-').next()?.strip_prefix("IXI")?.parse().ok(),
        },
    ]
});

/// 查找文件名对应的命名规则. 无规则命中时返回 `None`.
pub fn naming_rule_of(file_name: &str) -> Option<&'static NamingRule> {
    NAMING_RULES.iter().find(|r| file_name.starts_with(r.prefix))
}

/// 从数据集文件名解析 subject id.
///
/// 文件名不符合任何已注册惯例, 或 id 段不是数字时返回 `None`.
pub fn resolve_subject_id(file_name: &str) -> Option<u32> {
    (naming_rule_of(file_name)?.parse)(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
ID,GENDER,AGE
0001,M,74
0002,F,\"16,5\"
0003,X,30
0004,M,JUV
bad,M,30
";

    #[test]
    fn test_age_banding() {
        assert_eq!(AgeBand::from_field("17"), AgeBand::Minor);
        assert_eq!(AgeBand::from_field("18"), AgeBand::Adult);
        assert_eq!(AgeBand::from_field("64.9"), AgeBand::Adult);
        assert_eq!(AgeBand::from_field("65"), AgeBand::Senior);
        assert_eq!(AgeBand::from_field("74,5"), AgeBand::Senior);
        assert_eq!(AgeBand::from_field("JUV"), AgeBand::Unknown);
        assert_eq!(AgeBand::from_field(""), AgeBand::Unknown);
    }

    #[test]
    fn test_table_membership() {
        let table = SubjectTable::from_reader(Cursor::new(SAMPLE)).unwrap();
        // 畸形 id 行被跳过.
        assert_eq!(table.len(), 4);

        assert_eq!(
            table.cohorts_of(1),
            vec![Cohort::Male, Cohort::Senior, Cohort::Overall]
        );
        assert_eq!(
            table.cohorts_of(2),
            vec![Cohort::Female, Cohort::Minor, Cohort::Overall]
        );
        // 性别未识别, 年龄正常.
        assert_eq!(table.cohorts_of(3), vec![Cohort::Adult, Cohort::Overall]);
        // 年龄无数字.
        assert_eq!(table.cohorts_of(4), vec![Cohort::Male, Cohort::Overall]);
        // 表中不存在的 subject 仍属于 Overall.
        assert_eq!(table.cohorts_of(42), vec![Cohort::Overall]);
    }

    #[test]
    fn test_missing_column() {
        let bad = "ID,SEX,AGE\n";
        assert!(matches!(
            SubjectTable::from_reader(Cursor::new(bad)),
            Err(SubjectTableError::MissingColumn("GENDER"))
        ));
    }

    #[test]
    fn test_resolve_subject_id() {
        assert_eq!(resolve_subject_id("OAS1_0001_MR1_mpr_n4_seg.nii.gz"), Some(1));
        assert_eq!(resolve_subject_id("IBSR_01_segTRI_ana.nii.gz"), Some(1));
        assert_eq!(resolve_subject_id("KKI2009-21-FLAIR.nii.gz"), Some(21));
        assert_eq!(resolve_subject_id("IXI002-Guys-0828-T2.nii.gz"), Some(2));
        assert_eq!(resolve_subject_id("foo-1.nii.gz"), None);
        assert_eq!(resolve_subject_id("IXIxx-Guys"), None);
    }

    #[test]
    fn test_naming_rule_modality() {
        assert_eq!(naming_rule_of("KKI2009-21").unwrap().modality, "FLAIR");
        assert_eq!(naming_rule_of("OAS1_0001").unwrap().modality, "T1");
        assert!(naming_rule_of("ADNI_123").is_none());
    }
}
