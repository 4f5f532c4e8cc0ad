//! 轨迹关联 (Trajectory linking)
//!
//! 核心思想:
//! 1. 按帧顺序处理检测点
//! 2. 活跃轨迹与当前帧检测点做最近邻匹配 (搜索半径内, 贪心)
//! 3. 允许轨迹跨越 `memory` 帧缺失 (gap-closing)
//! 4. 未匹配的检测点 → 新轨迹, 超出缺失窗口的轨迹 → 结束
//! 5. 全部完成后过滤掉过短轨迹

use tracing::{debug, info, warn};

use super::types::{Detection, DetectionArena, ParticleId, Trajectory, TrajectorySet};
use crate::config::LinkingConfig;
use crate::error::{AnalysisError, Result};

/// 关联中的轨迹 (只保存检测点下标)
struct LinkedTrack {
    id: ParticleId,
    indices: Vec<usize>,
    last_frame: u32,
}

/// 轨迹关联器
pub struct TrajectoryLinker {
    /// 最近邻搜索半径
    search_range: f32,

    /// 最大允许缺失帧数
    memory: u32,

    /// 最短轨迹长度
    min_length: usize,
}

impl TrajectoryLinker {
    pub fn new(config: &LinkingConfig) -> Self {
        Self {
            search_range: config.search_range,
            memory: config.memory,
            min_length: config.min_length,
        }
    }

    /// 关联全部检测点并过滤短轨迹
    pub fn link(&self, detections: Vec<Detection>) -> Result<TrajectorySet> {
        let total = detections.len();
        let detections: Vec<Detection> = detections.into_iter().filter(Detection::is_finite).collect();
        if detections.len() < total {
            warn!("⚠️ 跳过 {} 个坐标无效的检测点", total - detections.len());
        }
        if detections.is_empty() {
            return Err(AnalysisError::NoDetections);
        }

        let arena = DetectionArena::new(detections);
        let tracks = self.assemble(&arena);
        let assembled = tracks.len();

        let set: TrajectorySet = tracks
            .into_iter()
            .filter(|t| t.indices.len() >= self.min_length)
            .map(|t| Trajectory::new(t.id, arena.resolve(&t.indices)))
            .collect::<Result<_>>()?;

        info!(
            "🔗 轨迹关联: {} 个检测点 → {} 条轨迹, 过滤后保留 {} 条 (min_length={})",
            arena.len(),
            assembled,
            set.len(),
            self.min_length
        );

        if set.is_empty() {
            return Err(AnalysisError::NoTrajectories {
                min_length: self.min_length,
            });
        }
        Ok(set)
    }

    /// 逐帧关联, 返回全部轨迹 (未过滤)
    fn assemble(&self, arena: &DetectionArena) -> Vec<LinkedTrack> {
        let mut active: Vec<LinkedTrack> = Vec::new();
        let mut finished: Vec<LinkedTrack> = Vec::new();
        let mut next_id: ParticleId = 0;

        for (frame, det_indices) in arena.frames() {
            // 1. 结束缺失过久的轨迹
            let (alive, expired): (Vec<_>, Vec<_>) = active
                .into_iter()
                .partition(|t| frame - t.last_frame - 1 <= self.memory);
            finished.extend(expired);
            active = alive;

            // 2. 最近邻匹配
            let assignments = self.match_detections_to_tracks(arena, det_indices, &active);

            let mut matched_det = vec![false; det_indices.len()];
            for (local_det, track_idx) in assignments {
                matched_det[local_det] = true;
                let track = &mut active[track_idx];
                track.indices.push(det_indices[local_det]);
                track.last_frame = frame;
            }

            // 3. 未匹配的检测点 → 新建轨迹
            for (local_det, &matched) in matched_det.iter().enumerate() {
                if !matched {
                    active.push(LinkedTrack {
                        id: next_id,
                        indices: vec![det_indices[local_det]],
                        last_frame: frame,
                    });
                    next_id += 1;
                }
            }

            debug!(frame, detections = det_indices.len(), active = active.len(), "linked frame");
        }

        finished.extend(active);
        finished.sort_by_key(|t| t.id);
        finished
    }

    /// 距离匹配: 按距离贪心分配, 每条轨迹/每个检测点最多用一次
    fn match_detections_to_tracks(
        &self,
        arena: &DetectionArena,
        det_indices: &[usize],
        tracks: &[LinkedTrack],
    ) -> Vec<(usize, usize)> {
        if det_indices.is_empty() || tracks.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (local_det, &det_idx) in det_indices.iter().enumerate() {
            let detection = arena.get(det_idx);
            for (track_idx, track) in tracks.iter().enumerate() {
                let last = arena.get(track.indices[track.indices.len() - 1]);
                let dist = detection.distance(last);
                if dist <= self.search_range {
                    candidates.push((dist, track_idx, local_det));
                }
            }
        }

        // 贪心匹配: 按距离排序, 并列时按轨迹/检测顺序
        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let mut assignments = Vec::new();
        let mut used_det = vec![false; det_indices.len()];
        let mut used_track = vec![false; tracks.len()];

        for (_, track_idx, local_det) in candidates {
            if !used_det[local_det] && !used_track[track_idx] {
                assignments.push((local_det, track_idx));
                used_det[local_det] = true;
                used_track[track_idx] = true;
            }
        }

        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linker(search_range: f32, memory: u32, min_length: usize) -> TrajectoryLinker {
        TrajectoryLinker::new(&LinkingConfig {
            search_range,
            memory,
            min_length,
        })
    }

    /// 一个粒子沿x轴移动, 跳过给定帧
    fn walker(frames: impl Iterator<Item = u32>, y: f32) -> Vec<Detection> {
        frames
            .map(|f| Detection::new(f, 10.0 + f as f32, y, 100.0))
            .collect()
    }

    #[test]
    fn test_empty_input_is_surfaced() {
        let err = linker(5.0, 2, 1).link(Vec::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::NoDetections));
        assert!(err.is_nothing_to_analyze());
    }

    #[test]
    fn test_gap_closing_within_memory() {
        let dets = walker((0..100).filter(|f| *f != 50 && *f != 51), 20.0);

        let set = linker(5.0, 2, 5).link(dets.clone()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().len(), 98);

        let set = linker(5.0, 0, 5).link(dets).unwrap();
        assert_eq!(set.len(), 2);
        let lengths: Vec<usize> = set.iter().map(Trajectory::len).collect();
        assert_eq!(lengths, vec![50, 48]);
    }

    #[test]
    fn test_min_length_filter() {
        let mut dets = walker(0..20, 20.0);
        // 单帧噪声
        dets.push(Detection::new(7, 200.0, 200.0, 1.0));
        dets.push(Detection::new(13, 300.0, 50.0, 1.0));

        let set = linker(5.0, 1, 10).link(dets).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.iter().all(|t| t.len() >= 10));
    }

    #[test]
    fn test_everything_filtered_is_surfaced() {
        let dets = walker(0..3, 20.0);
        let err = linker(5.0, 1, 10).link(dets).unwrap_err();
        assert!(matches!(err, AnalysisError::NoTrajectories { min_length: 10 }));
    }

    #[test]
    fn test_two_particles_keep_identity() {
        let mut dets = walker(0..30, 20.0);
        dets.extend(walker(0..30, 60.0));

        let set = linker(5.0, 0, 10).link(dets).unwrap();
        assert_eq!(set.len(), 2);
        for t in set.iter() {
            let y0 = t.first().y;
            assert!(t.detections().iter().all(|d| d.y == y0));
            assert!(t.detections().windows(2).all(|w| w[1].frame > w[0].frame));
        }
    }

    #[test]
    fn test_beyond_search_range_starts_new_track() {
        let mut dets = walker(0..10, 20.0);
        // 第10帧开始跳到远处
        dets.extend((10..20).map(|f| Detection::new(f, 500.0 + f as f32, 20.0, 1.0)));

        let set = linker(5.0, 3, 5).link(dets).unwrap();
        assert_eq!(set.len(), 2);
    }
}
