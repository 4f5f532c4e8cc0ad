//! 轨迹表 (Persisted trajectory table)
//!
//! 跟踪阶段与分类阶段之间唯一的持久化交换格式:
//! `particle,frame,x,y,signal`

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::{Detection, ParticleId, Trajectory, TrajectorySet};
use crate::error::{AnalysisError, Result};

/// 轨迹表的一行
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackRow {
    pub particle: ParticleId,
    pub frame: u32,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub signal: f32,
}

/// 展开为按 (particle, frame) 排序的行
pub fn to_rows(set: &TrajectorySet) -> Vec<TrackRow> {
    set.iter()
        .flat_map(|t| {
            t.detections().iter().map(move |d| TrackRow {
                particle: t.particle_id(),
                frame: d.frame,
                x: d.x,
                y: d.y,
                signal: d.signal,
            })
        })
        .collect()
}

/// 由行重建轨迹集合 (行顺序无关, 同一粒子帧号不能重复)
pub fn from_rows(rows: impl IntoIterator<Item = TrackRow>) -> Result<TrajectorySet> {
    let mut grouped: BTreeMap<ParticleId, Vec<Detection>> = BTreeMap::new();
    for row in rows {
        if !row.x.is_finite() || !row.y.is_finite() {
            return Err(AnalysisError::Table(format!(
                "particle {} frame {}: non-finite coordinate",
                row.particle, row.frame
            )));
        }
        grouped
            .entry(row.particle)
            .or_default()
            .push(Detection::new(row.frame, row.x, row.y, row.signal));
    }

    grouped
        .into_iter()
        .map(|(particle, mut dets)| {
            dets.sort_by_key(|d| d.frame);
            Trajectory::new(particle, dets)
        })
        .collect()
}

pub fn write_table_to<W: Write>(set: &TrajectorySet, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in to_rows(set) {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_table_from<R: Read>(reader: R) -> Result<TrajectorySet> {
    let mut rdr = csv::Reader::from_reader(reader);
    let rows = rdr
        .deserialize::<TrackRow>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    from_rows(rows)
}

/// 写出轨迹表
pub fn write_table(set: &TrajectorySet, path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_table_to(set, file)?;
    info!(
        "💾 轨迹表已保存: {} ({} 条轨迹, {} 行)",
        path.as_ref().display(),
        set.len(),
        set.detection_count()
    );
    Ok(())
}

/// 读取轨迹表
pub fn read_table(path: impl AsRef<Path>) -> Result<TrajectorySet> {
    let file = std::fs::File::open(path.as_ref())?;
    let set = read_table_from(file)?;
    info!(
        "📂 轨迹表已加载: {} ({} 条轨迹)",
        path.as_ref().display(),
        set.len()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_grouped_and_sorted() {
        let csv = "particle,frame,x,y,signal\n\
                   4,2,1.0,1.0,5.0\n\
                   1,0,0.0,0.0,1.0\n\
                   4,1,0.5,0.5,3.0\n";
        let set = read_table_from(csv.as_bytes()).unwrap();
        assert_eq!(set.len(), 2);
        let t = set.get(4).unwrap();
        assert_eq!(t.detections()[0].frame, 1);
        assert_eq!(t.detections()[1].signal, 5.0);
    }

    #[test]
    fn test_duplicate_frame_is_rejected() {
        let csv = "particle,frame,x,y,signal\n1,3,0,0,1\n1,3,1,1,1\n";
        let err = read_table_from(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, AnalysisError::Table(_)));
    }

    #[test]
    fn test_missing_signal_column_defaults_to_zero() {
        let csv = "particle,frame,x,y\n2,0,3.5,4.5\n";
        let set = read_table_from(csv.as_bytes()).unwrap();
        assert_eq!(set.get(2).unwrap().first().signal, 0.0);
    }
}
