//! 结果导出: 逐粒子 CSV + 报告 JSON

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use super::aggregator::AggregateReport;
use crate::error::Result;
use crate::kinematics::KinematicSummary;
use crate::models::{ClassificationResult, MotionLabel, ShapeLabel};
use crate::tracking::ParticleId;

/// 单个粒子的运动学 + 分类结果 (未分类的列留空)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParticleRecord {
    pub particle: ParticleId,
    pub mean_velocity: f32,
    pub linearity: f32,
    pub path_length: f32,
    pub straight_line_velocity: f32,
    pub duration_s: f32,
    pub motion: Option<MotionLabel>,
    pub motion_confidence: Option<f32>,
    pub shape: Option<ShapeLabel>,
    pub shape_confidence: Option<f32>,
}

/// 按粒子ID合并运动学与两个维度的分类结果
pub fn particle_records(
    kinematics: &[KinematicSummary],
    motion: &[ClassificationResult<MotionLabel>],
    shape: &[ClassificationResult<ShapeLabel>],
) -> Vec<ParticleRecord> {
    let motion: BTreeMap<_, _> = motion.iter().map(|r| (r.particle_id, r)).collect();
    let shape: BTreeMap<_, _> = shape.iter().map(|r| (r.particle_id, r)).collect();

    kinematics
        .iter()
        .map(|k| {
            let m = motion.get(&k.particle_id);
            let s = shape.get(&k.particle_id);
            ParticleRecord {
                particle: k.particle_id,
                mean_velocity: k.mean_velocity,
                linearity: k.linearity,
                path_length: k.path_length,
                straight_line_velocity: k.straight_line_velocity,
                duration_s: k.duration_s,
                motion: m.map(|r| r.label),
                motion_confidence: m.map(|r| r.confidence),
                shape: s.map(|r| r.label),
                shape_confidence: s.map(|r| r.confidence),
            }
        })
        .collect()
}

pub fn write_particle_table_to<W: Write>(records: &[ParticleRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_particle_table(records: &[ParticleRecord], path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_particle_table_to(records, file)?;
    info!("💾 逐粒子结果已保存: {} ({} 行)", path.as_ref().display(), records.len());
    Ok(())
}

pub fn write_report_json(report: &AggregateReport, path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    serde_json::to_writer_pretty(file, report)?;
    info!("📄 报告已保存: {}", path.as_ref().display());
    Ok(())
}
