//! 多数投票标签融合.
//!
//! 对 N 张共配准的 3D 标签图做逐体素 plurality 投票 (最高票标签获胜,
//! 不要求过半). 票数并列第一的体素无法直接判定, 投票阶段以 sentinel 值
//! 标记 — sentinel 严格大于全部输入标签, 因此它就是投票结果中的最大值.
//! 修复阶段通过三维精确欧氏距离变换, 将每个 sentinel 体素替换为距其最近的
//! 有效 (严格为正且非 sentinel) 标签.
//!
//! 整个流程是对内存中体积数据的单遍无状态变换: 投票 -> 检出 sentinel ->
//! 距离填充. 不存在任何持久状态.

use itertools::Itertools;
use ndarray::Array3;

use crate::consts::label::BACKGROUND;
use crate::{Idx3d, MrLabel, NiftiHeaderAttr};

mod edt;

/// 标签融合的前置条件错误. 任何此类错误都在投票开始前报告 (fail fast).
#[derive(Debug)]
pub enum FuseError {
    /// 输入标签图列表为空.
    NoInput,

    /// 第 `index` 张输入图与第一张形状不一致.
    ShapeMismatch {
        /// 形状不一致的输入图下标.
        index: usize,

        /// 期望形状 (第一张输入图的形状).
        expect: Idx3d,

        /// 实际形状.
        found: Idx3d,
    },
}

/// 投票阶段的产物.
#[derive(Debug, Clone)]
pub struct Voted {
    /// 投票结果. 无法判定的体素持有 [`Self::sentinel`] 值.
    pub label: MrLabel,

    /// sentinel 值. 严格大于全部输入标签值.
    pub sentinel: u16,

    /// 无法判定 (平票) 的体素个数.
    pub undecided: usize,
}

/// 对 N 张共配准标签图做逐体素 plurality 投票.
///
/// 物理空间元信息取自第一张输入图. 平票体素以 sentinel 标记,
/// 留待 [`repair`] 修复. 输入为空或形状不一致时返回 `Err`.
///
/// 输入标签最大值达到 `u16::MAX` 时无法保留 sentinel 空间, 程序 panic.
pub fn vote(maps: &[MrLabel]) -> Result<Voted, FuseError> {
    let first = maps.first().ok_or(FuseError::NoInput)?;
    let expect = first.shape();
    for (index, m) in maps.iter().enumerate().skip(1) {
        let found = m.shape();
        if found != expect {
            return Err(FuseError::ShapeMismatch {
                index,
                expect,
                found,
            });
        }
    }

    let max_label = maps
        .iter()
        .filter_map(MrLabel::max_label)
        .max()
        .unwrap_or(BACKGROUND);
    assert!(max_label < u16::MAX, "标签值空间已满, 无法分配 sentinel");
    let sentinel = max_label + 1;

    // 所有输入均为标准布局 (open/fake 均保证), 可按扁平切片同步遍历.
    let views: Vec<&[u16]> = maps
        .iter()
        .map(|m| {
            // 该操作不会失败, 可直接 unwrap.
            m.data().to_slice().unwrap()
        })
        .collect();

    let len = views[0].len();
    let mut out = Vec::with_capacity(len);
    let mut undecided = 0usize;
    let mut ballot: Vec<u16> = Vec::with_capacity(maps.len());

    for i in 0..len {
        ballot.clear();
        ballot.extend(views.iter().map(|v| v[i]));
        ballot.sort_unstable();

        // (票数, 标签) 游程统计. 取最高票; 并列第一时标记为 sentinel.
        let mut best = (0usize, BACKGROUND);
        let mut tied = false;
        for (count, label) in ballot.iter().dedup_with_count() {
            match count.cmp(&best.0) {
                std::cmp::Ordering::Greater => {
                    best = (count, *label);
                    tied = false;
                }
                std::cmp::Ordering::Equal => tied = true,
                std::cmp::Ordering::Less => {}
            }
        }

        if tied {
            undecided += 1;
            out.push(sentinel);
        } else {
            out.push(best.1);
        }
    }

    // 形状来自第一张输入图, 该操作不会生成 `Err`, 可直接 unwrap.
    let data = Array3::from_shape_vec(expect, out).unwrap();
    Ok(Voted {
        label: MrLabel::from_zhw(first.header(), data),
        sentinel,
        undecided,
    })
}

/// 修复投票结果中的全部 sentinel 体素.
///
/// 每个 sentinel 体素被替换为距其欧氏距离最近 (体素索引空间,
/// 三维距离变换) 的有效标签 — 有效指严格为正且非 sentinel.
/// 等距并列由距离变换的扫描顺序决定, 结果确定.
///
/// 返回成功修复的体素个数. 两种退化情形直接返回 0:
/// 没有 sentinel 体素 (无需修复), 或不存在任何有效标签体素 (无修复来源,
/// 结果保持原样).
pub fn repair(voted: &mut Voted) -> usize {
    if voted.undecided == 0 {
        return 0;
    }

    let sentinel = voted.sentinel;
    let data = voted.label.data();
    let valid = data.map(|v| *v != sentinel && *v > BACKGROUND);
    if !valid.iter().any(|m| *m) {
        // 整卷都是 sentinel/背景, 没有可抄的来源.
        return 0;
    }

    let src = edt::nearest_source(&valid);
    let to_fix: Vec<Idx3d> = voted.label.filter_pos_sentinel(sentinel);
    let fixed = to_fix.len();
    for pos in to_fix {
        let nearest = edt::nearest_of(&src, pos);
        voted.label[pos] = voted.label[nearest];
    }
    voted.undecided = 0;
    fixed
}

impl MrLabel {
    /// 收集全部等于 `sentinel` 的体素下标. 结果按行优先存储.
    fn filter_pos_sentinel(&self, sentinel: u16) -> Vec<Idx3d> {
        self.data()
            .indexed_iter()
            .filter_map(|(pos, v)| (*v == sentinel).then_some(pos))
            .collect()
    }
}

/// 投票 + 修复的一站式入口.
///
/// 至少存在一个有效标签体素时, 保证输出不含任何 sentinel 体素.
pub fn fuse(maps: &[MrLabel]) -> Result<MrLabel, FuseError> {
    let mut voted = vote(maps)?;
    repair(&mut voted);
    Ok(voted.label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// 以给定扁平数据构造 [W, H, z] = [3, 2, 2] 的标签图.
    fn label_from(flat: &[u16]) -> MrLabel {
        assert_eq!(flat.len(), 12);
        // fake 接受 [W, H, z] 布局.
        let zhw = Array3::from_shape_vec((2, 2, 3), flat.to_vec()).unwrap();
        let whz = zhw.permuted_axes([2, 1, 0]).as_standard_layout().to_owned();
        MrLabel::fake(whz, [1.0, 1.0, 1.0])
    }

    fn uniform(value: u16) -> MrLabel {
        label_from(&[value; 12])
    }

    #[test]
    fn test_plurality_wins() {
        // [5, 5, 7] -> 5.
        let consensus = fuse(&[uniform(5), uniform(5), uniform(7)]).unwrap();
        assert_eq!(consensus.count(5), 12);
    }

    #[test]
    fn test_tie_then_repair() {
        // 仅 (0, 0, 0) 三方平票 [5, 7, 9], 其余体素一致为 5.
        let a = uniform(5);
        let mut b = uniform(5);
        let mut c = uniform(5);
        b[(0, 0, 0)] = 7;
        c[(0, 0, 0)] = 9;

        let mut voted = vote(&[a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(voted.sentinel, 10);
        assert_eq!(voted.undecided, 1);
        assert_eq!(voted.label[(0, 0, 0)], 10);

        let fixed = repair(&mut voted);
        assert_eq!(fixed, 1);
        // 修复后不允许残留 sentinel, 最近有效标签是 5.
        assert_eq!(voted.label.count(10), 0);
        assert_eq!(voted.label.count(5), 12);

        // 一站式入口结果一致.
        let consensus = fuse(&[a, b, c]).unwrap();
        assert_eq!(consensus.count(5), 12);
    }

    #[test]
    fn test_no_tie_no_repair() {
        let mut voted = vote(&[uniform(5), uniform(5), uniform(7)]).unwrap();
        assert_eq!(voted.undecided, 0);
        assert_eq!(repair(&mut voted), 0);
        assert_eq!(voted.label.count(5), 12);
    }

    #[test]
    fn test_two_way_tie() {
        // 两张图处处不一致: 每个体素都平票.
        let mut voted = vote(&[uniform(5), uniform(7)]).unwrap();
        assert_eq!(voted.undecided, 12);
        // 无有效来源 (全 sentinel), 保持原样.
        assert_eq!(repair(&mut voted), 0);
        assert_eq!(voted.label.count(voted.sentinel), 12);
    }

    #[test]
    fn test_repair_prefers_nearest() {
        // 平票体素位于 (0, 0, 0); (0, 0, 1) 是 3, (z=1) 平面较远处是 8.
        let mut a = uniform(0);
        let mut b = uniform(0);
        let mut c = uniform(0);
        for m in [&mut a, &mut b, &mut c] {
            m[(0, 0, 1)] = 3;
            m[(1, 1, 2)] = 8;
        }
        a[(0, 0, 0)] = 1;
        b[(0, 0, 0)] = 2;
        c[(0, 0, 0)] = 4;

        let consensus = fuse(&[a, b, c]).unwrap();
        assert_eq!(consensus[(0, 0, 0)], 3);
        assert_eq!(consensus[(1, 1, 2)], 8);
    }

    #[test]
    fn test_shape_mismatch_fail_fast() {
        let a = uniform(1);
        let small = MrLabel::fake(Array3::<u16>::zeros((2, 2, 2)), [1.0, 1.0, 1.0]);
        match vote(&[a, small]) {
            Err(FuseError::ShapeMismatch {
                index,
                expect,
                found,
            }) => {
                assert_eq!(index, 1);
                assert_eq!(expect, (2, 2, 3));
                assert_eq!(found, (2, 2, 2));
            }
            other => panic!("意外结果: {other:?}"),
        }
    }

    #[test]
    fn test_no_input() {
        assert!(matches!(fuse(&[]), Err(FuseError::NoInput)));
    }

    #[test]
    fn test_all_background_unchanged() {
        let consensus = fuse(&[uniform(0), uniform(0)]).unwrap();
        assert!(consensus.is_all_background());
    }
}
