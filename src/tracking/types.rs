/// 轨迹系统数据结构定义
/// Data structures for the tracking stage
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// 粒子ID (一次运行内唯一)
pub type ParticleId = u32;

// ========== 数据结构 ==========

/// 检测点 (外部检测器输出, 每帧一组)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub frame: u32,
    pub x: f32,
    pub y: f32,
    #[serde(default, alias = "mass")]
    pub signal: f32,
}

impl Detection {
    pub fn new(frame: u32, x: f32, y: f32, signal: f32) -> Self {
        Self { frame, x, y, signal }
    }

    /// 欧氏距离
    pub fn distance(&self, other: &Detection) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// 检测点仓库: 按帧索引的检测点数组
///
/// 关联阶段只保存下标, 不构造嵌套的可变结构。
#[derive(Debug, Default, Clone)]
pub struct DetectionArena {
    detections: Vec<Detection>,
    by_frame: BTreeMap<u32, Vec<usize>>,
}

impl DetectionArena {
    pub fn new(detections: Vec<Detection>) -> Self {
        let mut by_frame: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
        for (idx, det) in detections.iter().enumerate() {
            by_frame.entry(det.frame).or_default().push(idx);
        }
        Self {
            detections,
            by_frame,
        }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Detection {
        &self.detections[idx]
    }

    /// 按帧升序遍历 (帧号, 该帧检测点下标)
    pub fn frames(&self) -> impl Iterator<Item = (u32, &[usize])> {
        self.by_frame.iter().map(|(f, idxs)| (*f, idxs.as_slice()))
    }

    /// 将下标列表还原为检测点序列
    pub fn resolve(&self, indices: &[usize]) -> Vec<Detection> {
        indices.iter().map(|&i| self.detections[i]).collect()
    }
}

/// 单个粒子的轨迹 (帧号严格递增)
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    particle_id: ParticleId,
    detections: Vec<Detection>,
}

impl Trajectory {
    /// 创建轨迹, 检查帧号严格递增
    pub fn new(particle_id: ParticleId, detections: Vec<Detection>) -> Result<Self> {
        if detections.is_empty() {
            return Err(AnalysisError::Table(format!(
                "particle {} has no detections",
                particle_id
            )));
        }
        if let Some(w) = detections.windows(2).find(|w| w[1].frame <= w[0].frame) {
            return Err(AnalysisError::Table(format!(
                "particle {}: frame {} follows frame {}",
                particle_id, w[1].frame, w[0].frame
            )));
        }
        Ok(Self {
            particle_id,
            detections,
        })
    }

    pub fn particle_id(&self) -> ParticleId {
        self.particle_id
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn first(&self) -> &Detection {
        &self.detections[0]
    }

    pub fn last(&self) -> &Detection {
        &self.detections[self.detections.len() - 1]
    }

    /// 信号最强的检测点 (并列取最早)
    pub fn best_detection(&self) -> &Detection {
        let mut best = &self.detections[0];
        for det in &self.detections[1..] {
            if det.signal > best.signal {
                best = det;
            }
        }
        best
    }

    /// 只改坐标, 不改帧号和ID
    pub(crate) fn map_positions(&self, mut f: impl FnMut(&Detection) -> (f32, f32)) -> Self {
        let detections = self
            .detections
            .iter()
            .map(|d| {
                let (x, y) = f(d);
                Detection { x, y, ..*d }
            })
            .collect();
        Self {
            particle_id: self.particle_id,
            detections,
        }
    }
}

/// 一次运行的全部轨迹 (按粒子ID有序)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrajectorySet {
    tracks: BTreeMap<ParticleId, Trajectory>,
}

impl TrajectorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trajectory: Trajectory) -> Option<Trajectory> {
        self.tracks.insert(trajectory.particle_id, trajectory)
    }

    pub fn get(&self, id: ParticleId) -> Option<&Trajectory> {
        self.tracks.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trajectory> {
        self.tracks.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.tracks.keys().copied()
    }

    /// 检测点总数
    pub fn detection_count(&self) -> usize {
        self.tracks.values().map(Trajectory::len).sum()
    }

    /// 所有轨迹覆盖的帧范围
    pub fn frame_span(&self) -> Option<(u32, u32)> {
        let first = self.tracks.values().map(|t| t.first().frame).min()?;
        let last = self.tracks.values().map(|t| t.last().frame).max()?;
        Some((first, last))
    }
}

impl FromIterator<Trajectory> for TrajectorySet {
    fn from_iter<I: IntoIterator<Item = Trajectory>>(iter: I) -> Self {
        let mut set = TrajectorySet::new();
        for t in iter {
            set.insert(t);
        }
        set
    }
}
