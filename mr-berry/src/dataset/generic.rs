//! 通用 MRI 标签数据加载器.
//!
//! 提供迭代器风格的数据集获取模式.

use crate::MrLabel;
use std::path::{Path, PathBuf};

/// 文件名构造器. 接受数据集索引数, 获得文件名.
pub type FilenameBuilder = fn(u32) -> String;

/// 从指定索引、路径、文件名构造器来创建通用的 MRI labels 加载器.
///
/// # 注意
///
/// 1. `path` 必须是目录, 否则程序 panic.
/// 2. `data` 的所有取值 `value` 必须在 `path` 下有形如 `builder(value)` 的 nifti
///   文件, 否则加载器在迭代时会返回 `Result::Error`.
pub fn label_loader<I: IntoIterator<Item = u32>, P: AsRef<Path>>(
    data: I,
    path: P,
    builder: FilenameBuilder,
) -> LabelLoader {
    let path = path.as_ref().to_owned();
    assert!(path.is_dir());

    let mut data: Vec<u32> = data.into_iter().collect();
    data.reverse();

    LabelLoader {
        path,
        data_rev: data,
        builder,
    }
}

/// 3D MRI labels 数据加载器, 并在内部自动转换文件名.
#[derive(Debug)]
pub struct LabelLoader {
    path: PathBuf,
    data_rev: Vec<u32>,
    builder: FilenameBuilder,
}

impl Iterator for LabelLoader {
    type Item = (u32, nifti::Result<MrLabel>);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.data_rev.pop()?;

        self.path.push((self.builder)(idx));
        let data = MrLabel::open(self.path.as_path());
        self.path.pop();

        Some((idx, data))
    }
}

impl ExactSizeIterator for LabelLoader {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}

/// 罗列目录下全部 nifti 标签文件 (`.nii` / `.nii.gz`) 的文件名, 字典序排列.
///
/// `path` 不是目录或不可读时返回 `Err`.
pub fn list_label_files<P: AsRef<Path>>(path: P) -> std::io::Result<Vec<String>> {
    let mut ans = Vec::new();
    for entry in std::fs::read_dir(path.as_ref())? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            ans.push(name);
        }
    }
    ans.sort_unstable();
    Ok(ans)
}
