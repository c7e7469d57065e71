//! 解剖标签目录.
//!
//! 从分隔文件加载 `label id -> (显示名, RGB)` 的只读映射. 文件需要 `ID`,
//! `Labels`, `RGB` 三列. `RGB` 列为自由格式 (如 `(255, 0, 0)`),
//! 解析时只提取其中的数字.

use std::collections::btree_map::Iter;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::consts::UNKNOWN_LABEL_NAME;
use crate::table::{column_index, split_fields};

/// 加载标签目录时的错误.
///
/// 目录行的任何畸形条目都会中止加载, 而不是静默跳过 —
/// 错误的 id 映射会污染全部下游统计.
#[derive(Debug)]
pub enum CatalogError {
    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// 文件为空, 没有表头行.
    MissingHeader,

    /// 表头中缺少必要列. 参数为列名.
    MissingColumn(&'static str),

    /// id 字段不是合法非负整数. 参数为行号 (1 起始) 和原始字段.
    MalformedId(usize, String),

    /// 颜色字段无法提取出恰好三个 0..=255 的整数. 参数为行号和原始字段.
    MalformedColor(usize, String),
}

impl From<std::io::Error> for CatalogError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// 单个标签的目录条目.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// 解剖结构显示名.
    pub name: String,

    /// 可视化用 RGB 颜色.
    pub rgb: [u8; 3],
}

/// 解剖标签目录. 加载一次, 运行期间只读.
#[derive(Debug, Clone, Default)]
pub struct LabelCatalog {
    entries: BTreeMap<u16, CatalogEntry>,
}

impl LabelCatalog {
    /// 从本地路径打开标签目录文件.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        Self::from_reader(BufReader::new(File::open(path.as_ref())?))
    }

    /// 从任意 `BufRead` 加载标签目录.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, CatalogError> {
        let mut lines = reader.lines();
        let header = match lines.next() {
            Some(line) => split_fields(&line?),
            None => return Err(CatalogError::MissingHeader),
        };

        let id_col = column_index(&header, "ID").ok_or(CatalogError::MissingColumn("ID"))?;
        let name_col =
            column_index(&header, "Labels").ok_or(CatalogError::MissingColumn("Labels"))?;
        let rgb_col = column_index(&header, "RGB").ok_or(CatalogError::MissingColumn("RGB"))?;

        let mut entries = BTreeMap::new();
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // 表头为第 1 行.
            let line_no = line_no + 2;
            let fields = split_fields(&line);

            let raw_id = fields.get(id_col).map(String::as_str).unwrap_or("");
            let id: u16 = raw_id
                .trim()
                .parse()
                .map_err(|_| CatalogError::MalformedId(line_no, raw_id.to_owned()))?;

            let name = fields
                .get(name_col)
                .map(|s| s.trim().to_owned())
                .unwrap_or_default();

            let raw_rgb = fields.get(rgb_col).map(String::as_str).unwrap_or("");
            let rgb = parse_rgb(raw_rgb)
                .ok_or_else(|| CatalogError::MalformedColor(line_no, raw_rgb.to_owned()))?;

            // 与源表格行为一致: 重复 id 后出现者覆盖先出现者.
            entries.insert(id, CatalogEntry { name, rgb });
        }

        Ok(Self { entries })
    }

    /// 获取标签对应的目录条目. 未知标签返回 `None`.
    #[inline]
    pub fn get(&self, label: u16) -> Option<&CatalogEntry> {
        self.entries.get(&label)
    }

    /// 标签是否在目录中?
    #[inline]
    pub fn contains(&self, label: u16) -> bool {
        self.entries.contains_key(&label)
    }

    /// 获取标签显示名. 未知标签返回 [`UNKNOWN_LABEL_NAME`].
    #[inline]
    pub fn name_of(&self, label: u16) -> &str {
        self.get(label).map_or(UNKNOWN_LABEL_NAME, |e| &e.name)
    }

    /// 获取标签颜色. 未知标签返回全零颜色.
    #[inline]
    pub fn rgb_of(&self, label: u16) -> [u8; 3] {
        self.get(label).map_or([0, 0, 0], |e| e.rgb)
    }

    /// 目录条目个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 目录是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按标签 id 升序迭代目录条目.
    #[inline]
    pub fn iter(&self) -> Iter<'_, u16, CatalogEntry> {
        self.entries.iter()
    }
}

/// 从自由格式颜色字段提取 RGB 三元组.
///
/// 提取字段中的全部十进制数字串, 当且仅当恰好存在三个且均在
/// 0..=255 时返回 `Some`.
fn parse_rgb(field: &str) -> Option<[u8; 3]> {
    let mut nums = Vec::new();
    let mut cur: Option<u32> = None;
    for c in field.chars() {
        if let Some(d) = c.to_digit(10) {
            let acc = cur.unwrap_or(0).checked_mul(10)?.checked_add(d)?;
            cur = Some(acc);
        } else if let Some(n) = cur.take() {
            nums.push(n);
        }
    }
    if let Some(n) = cur {
        nums.push(n);
    }

    match nums.as_slice() {
        [r, g, b] if *r <= 255 && *g <= 255 && *b <= 255 => {
            Some([*r as u8, *g as u8, *b as u8])
        }
        _ => None,
    }
}
