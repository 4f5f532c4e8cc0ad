//! 漂移校正 (Drift correction)
//!
//! 每帧取所有活跃轨迹瞬时位移的中位数作为该帧的整体运动,
//! 从首帧开始累加得到每帧的漂移偏移, 再从所有轨迹坐标中减去。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::TrajectorySet;

/// 单帧漂移偏移 (相对首帧)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DriftVector {
    pub dx: f32,
    pub dy: f32,
}

impl DriftVector {
    pub const ZERO: DriftVector = DriftVector { dx: 0.0, dy: 0.0 };

    pub fn magnitude(&self) -> f32 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }
}

/// 每帧漂移表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftProfile {
    offsets: BTreeMap<u32, DriftVector>,
}

impl DriftProfile {
    /// 查询某帧偏移, 范围外为零
    pub fn offset(&self, frame: u32) -> DriftVector {
        self.offsets.get(&frame).copied().unwrap_or(DriftVector::ZERO)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, DriftVector)> + '_ {
        self.offsets.iter().map(|(f, v)| (*f, *v))
    }

    /// 最大累计漂移
    pub fn max_magnitude(&self) -> f32 {
        self.offsets
            .values()
            .map(DriftVector::magnitude)
            .fold(0.0, f32::max)
    }
}

/// 漂移校正器
#[derive(Debug, Default, Clone, Copy)]
pub struct DriftCorrector;

impl DriftCorrector {
    pub fn new() -> Self {
        Self
    }

    /// 计算每帧漂移
    pub fn compute(&self, set: &TrajectorySet) -> DriftProfile {
        let Some((first, last)) = set.frame_span() else {
            return DriftProfile::default();
        };

        // 1. 收集每帧的瞬时位移 (只用相邻帧的步)
        let mut steps: BTreeMap<u32, (Vec<f32>, Vec<f32>)> = BTreeMap::new();
        for traj in set.iter() {
            for w in traj.detections().windows(2) {
                if w[1].frame == w[0].frame + 1 {
                    let entry = steps.entry(w[1].frame).or_default();
                    entry.0.push(w[1].x - w[0].x);
                    entry.1.push(w[1].y - w[0].y);
                }
            }
        }

        // 2. 中位数 + 累加 (无活跃轨迹的帧位移为零)
        let mut offsets = BTreeMap::new();
        let mut cumulative = DriftVector::ZERO;
        offsets.insert(first, cumulative);
        for frame in first + 1..=last {
            if let Some((dxs, dys)) = steps.get_mut(&frame) {
                cumulative.dx += median(dxs);
                cumulative.dy += median(dys);
            }
            offsets.insert(frame, cumulative);
        }

        DriftProfile { offsets }
    }

    /// 应用漂移校正, 返回新的轨迹集合 (ID与成员不变)
    pub fn apply(&self, set: &TrajectorySet, profile: &DriftProfile) -> TrajectorySet {
        set.iter()
            .map(|traj| {
                traj.map_positions(|d| {
                    let offset = profile.offset(d.frame);
                    (d.x - offset.dx, d.y - offset.dy)
                })
            })
            .collect()
    }

    /// 计算并应用
    pub fn correct(&self, set: &TrajectorySet) -> (TrajectorySet, DriftProfile) {
        let profile = self.compute(set);
        let corrected = self.apply(set, &profile);
        info!(
            "🧭 漂移校正: {} 帧, 最大累计漂移 {:.2} px",
            profile.len(),
            profile.max_magnitude()
        );
        (corrected, profile)
    }
}

/// 中位数 (偶数个取中间两数均值)
fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
