/// CASA 运动学特征 (Kinematic descriptors)
///
/// - mean_velocity: 相邻检测点步长 × 帧率 的平均值 (VCL)
/// - linearity:     首尾直线距离 / 总路径长度, 路径为零时为 0
///
/// 与分类器无关, 分类器不可用时也照常计算。
use serde::{Deserialize, Serialize};

use crate::tracking::{ParticleId, Trajectory, TrajectorySet};

/// 单条轨迹的运动学摘要
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicSummary {
    pub particle_id: ParticleId,
    /// 平均曲线速度 (px/s)
    pub mean_velocity: f32,
    /// 直线度 [0, 1]
    pub linearity: f32,
    /// 总路径长度 (px)
    pub path_length: f32,
    /// 直线速度 VSL (px/s)
    pub straight_line_velocity: f32,
    /// 持续时间 (s)
    pub duration_s: f32,
}

/// 群体运动学概览
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicOverview {
    pub particles: usize,
    pub mean_velocity: Option<f32>,
    pub mean_linearity: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct KinematicAnalyzer {
    fps: f32,
}

impl KinematicAnalyzer {
    pub fn new(fps: f32) -> Self {
        Self { fps }
    }

    pub fn analyze(&self, trajectory: &Trajectory) -> KinematicSummary {
        let dets = trajectory.detections();

        let steps: Vec<f32> = dets.windows(2).map(|w| w[1].distance(&w[0])).collect();
        let path_length: f32 = steps.iter().sum();
        let mean_velocity = if steps.is_empty() {
            0.0
        } else {
            steps.iter().map(|s| s * self.fps).sum::<f32>() / steps.len() as f32
        };

        let straight = trajectory.last().distance(trajectory.first());
        let linearity = if path_length > 0.0 {
            (straight / path_length).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let duration_s = (trajectory.last().frame - trajectory.first().frame) as f32 / self.fps;
        let straight_line_velocity = if duration_s > 0.0 {
            straight / duration_s
        } else {
            0.0
        };

        KinematicSummary {
            particle_id: trajectory.particle_id(),
            mean_velocity,
            linearity,
            path_length,
            straight_line_velocity,
            duration_s,
        }
    }

    pub fn analyze_all(&self, set: &TrajectorySet) -> Vec<KinematicSummary> {
        set.iter().map(|t| self.analyze(t)).collect()
    }

    pub fn overview(summaries: &[KinematicSummary]) -> KinematicOverview {
        if summaries.is_empty() {
            return KinematicOverview::default();
        }
        let n = summaries.len() as f32;
        KinematicOverview {
            particles: summaries.len(),
            mean_velocity: Some(summaries.iter().map(|s| s.mean_velocity).sum::<f32>() / n),
            mean_linearity: Some(summaries.iter().map(|s| s.linearity).sum::<f32>() / n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Detection;
    use proptest::prelude::*;

    fn trajectory(points: &[(f32, f32)]) -> Trajectory {
        let dets = points
            .iter()
            .enumerate()
            .map(|(f, &(x, y))| Detection::new(f as u32, x, y, 1.0))
            .collect();
        Trajectory::new(0, dets).unwrap()
    }

    #[test]
    fn test_straight_line_is_fully_linear() {
        let t = trajectory(&[(0.0, 0.0), (3.0, 4.0), (6.0, 8.0), (9.0, 12.0)]);
        let k = KinematicAnalyzer::new(30.0).analyze(&t);
        assert!((k.linearity - 1.0).abs() < 1e-6);
        assert!((k.mean_velocity - 150.0).abs() < 1e-3);
        assert!((k.path_length - 15.0).abs() < 1e-5);
        assert!((k.duration_s - 0.1).abs() < 1e-6);
        assert!((k.straight_line_velocity - 150.0).abs() < 1e-2);
    }

    #[test]
    fn test_round_trip_has_zero_linearity() {
        let t = trajectory(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)]);
        let k = KinematicAnalyzer::new(30.0).analyze(&t);
        assert_eq!(k.linearity, 0.0);
        assert!(k.mean_velocity > 0.0);
    }

    #[test]
    fn test_stationary_particle() {
        let t = trajectory(&[(5.0, 5.0), (5.0, 5.0), (5.0, 5.0)]);
        let k = KinematicAnalyzer::new(30.0).analyze(&t);
        assert_eq!(k.linearity, 0.0);
        assert_eq!(k.mean_velocity, 0.0);

        let single = trajectory(&[(1.0, 1.0)]);
        let k = KinematicAnalyzer::new(30.0).analyze(&single);
        assert_eq!(k.mean_velocity, 0.0);
        assert_eq!(k.straight_line_velocity, 0.0);
    }

    #[test]
    fn test_overview() {
        assert_eq!(KinematicAnalyzer::overview(&[]).mean_velocity, None);

        let a = trajectory(&[(0.0, 0.0), (1.0, 0.0)]);
        let b = trajectory(&[(0.0, 0.0), (3.0, 0.0)]);
        let analyzer = KinematicAnalyzer::new(10.0);
        let overview = KinematicAnalyzer::overview(&[analyzer.analyze(&a), analyzer.analyze(&b)]);
        assert_eq!(overview.particles, 2);
        assert!((overview.mean_velocity.unwrap() - 20.0).abs() < 1e-5);
        assert_eq!(overview.mean_linearity, Some(1.0));
    }

    proptest! {
        #[test]
        fn prop_linearity_in_unit_range(
            points in prop::collection::vec((-500.0f32..500.0, -500.0f32..500.0), 1..60)
        ) {
            let k = KinematicAnalyzer::new(25.0).analyze(&trajectory(&points));
            prop_assert!((0.0..=1.0).contains(&k.linearity));
            prop_assert!(k.mean_velocity >= 0.0);
        }
    }
}
