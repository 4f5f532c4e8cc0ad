/// 轨迹系统 (Tracking System)
///
/// 检测点 → 轨迹 → 漂移校正 → 轨迹表
/// - Linker: 最近邻关联 + gap-closing + 短轨迹过滤
/// - Drift:  每帧整体漂移估计与校正
/// - Table:  持久化轨迹表 (particle,frame,x,y,signal)
pub mod drift;
pub mod linker;
pub mod table;
pub mod types;

pub use drift::{DriftCorrector, DriftProfile, DriftVector};
pub use linker::TrajectoryLinker;
pub use table::{read_table, write_table, TrackRow};
pub use types::{Detection, DetectionArena, ParticleId, Trajectory, TrajectorySet};
