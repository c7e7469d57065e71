//! 三维精确欧氏距离变换 (逐轴抛物线下包络法), 附带最近 source 索引回传.
//!
//! 对给定 source 集合, 为网格中每个体素求出欧氏距离最近的 source 体素索引.
//! 距离按体素索引空间计算 (不考虑体素各向异性). 逐轴一维变换依次作用于
//! 三个轴后即为精确平方距离; 每轴变换同时把 argmin 对应的 source
//! 索引传播下去, 因此结果对等距情形也是确定性的 (由扫描顺序决定).

use ndarray::{Array3, ArrayViewMut1, Axis, Zip};

use crate::{Idx3d, Idx3dU16};

/// 充分大的有限 "无穷" 距离. 取有限值以避免抛物线交点出现 NaN.
const INF: f64 = 1e30;

/// 计算每个体素最近 source 的索引.
///
/// `mask` 中为 `true` 的体素是 source. 要求至少存在一个 source 且
/// 每个维度不超过 `u16::MAX`, 否则程序 panic.
pub(crate) fn nearest_source(mask: &Array3<bool>) -> Array3<Idx3dU16> {
    let (z, h, w) = mask.dim();
    assert!(z <= u16::MAX as usize && h <= u16::MAX as usize && w <= u16::MAX as usize);
    assert!(mask.iter().any(|m| *m), "source 集合不能为空");

    let mut dist = Array3::<f64>::from_elem((z, h, w), INF);
    let mut src = Array3::<Idx3dU16>::from_elem((z, h, w), (0, 0, 0));
    for ((zi, hi, wi), m) in mask.indexed_iter() {
        if *m {
            dist[(zi, hi, wi)] = 0.0;
            src[(zi, hi, wi)] = (zi as u16, hi as u16, wi as u16);
        }
    }

    for axis in [Axis(0), Axis(1), Axis(2)] {
        Zip::from(dist.lanes_mut(axis))
            .and(src.lanes_mut(axis))
            .for_each(transform_lane);
    }

    src
}

/// 查询 `pos` 最近的 source 索引 (便捷入口).
#[inline]
pub(crate) fn nearest_of(src: &Array3<Idx3dU16>, pos: Idx3d) -> Idx3d {
    let (z, h, w) = src[pos];
    (z as usize, h as usize, w as usize)
}

/// 一维平方距离变换 (Felzenszwalb-Huttenlocher 下包络), 同时传播 source 索引.
///
/// `INF` 取有限值, 因此抛物线交点计算不会产生 NaN,
/// 即使整条 lane 都尚无可达 source.
fn transform_lane(mut d: ArrayViewMut1<f64>, mut s: ArrayViewMut1<Idx3dU16>) {
    let n = d.len();
    if n <= 1 {
        return;
    }

    let f: Vec<f64> = d.to_vec();
    let src0: Vec<Idx3dU16> = s.to_vec();

    // v: 下包络抛物线的顶点位置; bound: 相邻抛物线的分界点.
    let mut v = vec![0usize; n];
    let mut bound = vec![0.0f64; n + 1];
    let mut k = 0usize;
    bound[0] = -INF;
    bound[1] = INF;

    // 两条以 p, q 为顶点的抛物线的交点横坐标.
    let intersect = |p: usize, q: usize| -> f64 {
        let (pf, qf) = (p as f64, q as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    for q in 1..n {
        let mut cut = intersect(v[k], q);
        while k > 0 && cut <= bound[k] {
            k -= 1;
            cut = intersect(v[k], q);
        }
        k += 1;
        v[k] = q;
        bound[k] = cut;
        bound[k + 1] = INF;
    }

    k = 0;
    for q in 0..n {
        while bound[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let diff = q as f64 - p as f64;
        d[q] = diff * diff + f[p];
        s[q] = src0[p];
    }
}
