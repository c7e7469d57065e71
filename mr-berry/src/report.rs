//! 报告输出.
//!
//! 薄 I/O 层: 单 subject 的体积聚合 CSV 报告, 以及 cohort 统计 JSON 报告
//! (后者需要 `serde` feature). 报告仅落到平面文件, 不提供任何服务接口.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::aggregate::VolumeReport;

#[cfg(feature = "serde")]
use crate::stats::{CohortStats, StatKey};

/// 将体积聚合报告以 CSV 格式写入 `w`.
///
/// 列依次为 `ID, Label, RGB, Voxel Count, Volume (mm³), Volume Ratio (%)`.
/// 体积与占比保留两位小数; RGB 以 `[r, g, b]` 形式写出并加引号.
pub fn write_volume_csv<W: Write>(w: &mut W, report: &VolumeReport) -> io::Result<()> {
    writeln!(w, "ID,Label,RGB,Voxel Count,Volume (mm³),Volume Ratio (%)")?;
    for e in report.entries() {
        let [r, g, b] = e.rgb;
        writeln!(
            w,
            "{},{},\"[{r}, {g}, {b}]\",{},{:.2},{:.2}",
            e.label, e.name, e.voxel_count, e.volume_mm3, e.ratio
        )?;
    }
    Ok(())
}

/// 将体积聚合报告保存为 CSV 文件.
pub fn save_volume_csv<P: AsRef<Path>>(path: P, report: &VolumeReport) -> io::Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    write_volume_csv(&mut w, report)?;
    w.flush()
}

/// 将 cohort 统计渲染为 JSON 值.
///
/// 顶层为 `{"Group": 组名, "<label id>": 记录..., "Total": 整脑聚合记录}`,
/// 键的出现顺序与 [`CohortStats::records`] 一致 (CoV 降序, "Total" 在末尾).
#[cfg(feature = "serde")]
pub fn cohort_stats_json(group: &str, stats: &CohortStats) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("Group".to_owned(), serde_json::Value::String(group.to_owned()));
    for (key, record) in stats.records() {
        let key = match key {
            StatKey::Label(id) => id.to_string(),
            StatKey::TotalBrain => "Total".to_owned(),
        };
        // `LabelStats` 的序列化不会失败, 可直接 unwrap.
        map.insert(key, serde_json::to_value(record).unwrap());
    }
    serde_json::Value::Object(map)
}

/// 将 cohort 统计保存为 JSON 文件 (4 空格缩进).
#[cfg(feature = "serde")]
pub fn save_cohort_json<P: AsRef<Path>>(
    path: P,
    group: &str,
    stats: &CohortStats,
) -> io::Result<()> {
    let value = cohort_stats_json(group, stats);
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(&mut w, &value)?;
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::LabelCatalog;
    use crate::MrLabel;
    use ndarray::Array3;
    use std::io::Cursor;

    fn sample_report() -> VolumeReport {
        let src = "ID,Labels,RGB\n1,GM,\"(10, 20, 30)\"\n";
        let catalog = LabelCatalog::from_reader(Cursor::new(src)).unwrap();
        let mut data = Array3::<u16>::zeros((2, 2, 2));
        data[(0, 0, 0)] = 1;
        data[(1, 0, 0)] = 1;
        VolumeReport::from_label(&MrLabel::fake(data, [1.0, 1.0, 1.0]), &catalog)
    }

    #[test]
    fn test_volume_csv_format() {
        let mut buf = Vec::new();
        write_volume_csv(&mut buf, &sample_report()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "ID,Label,RGB,Voxel Count,Volume (mm³),Volume Ratio (%)"
        );
        assert_eq!(lines.next().unwrap(), "0,Unknown,\"[0, 0, 0]\",6,6.00,0.00");
        assert_eq!(
            lines.next().unwrap(),
            "1,GM,\"[10, 20, 30]\",2,2.00,100.00"
        );
        assert!(lines.next().is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_cohort_json_layout() {
        use crate::stats::CohortStats;

        let src = "ID,Labels,RGB\n1,GM,\"(1, 2, 3)\"\n";
        let catalog = LabelCatalog::from_reader(Cursor::new(src)).unwrap();
        let observations = vec![(1u16, 10.0, 50.0), (1u16, 12.0, 50.0)];
        let stats = CohortStats::from_observations(&observations, &[20.0, 24.0], &catalog);

        let value = cohort_stats_json("Male", &stats);
        let obj = value.as_object().unwrap();
        let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Group", "1", "Total"]);
        assert_eq!(obj["Group"], "Male");
        assert_eq!(obj["1"]["label_name"], "GM");
        assert_eq!(obj["1"]["avg_volume (mm3)"], 11.0);
        assert_eq!(obj["Total"]["avg_ratio_vol_totvol (%)"], 100.0);
        assert_eq!(obj["Total"]["label_name"], "Total brain");
    }
}
