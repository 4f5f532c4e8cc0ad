/// 输入系统 (Input System)
///
/// - Detections: 外部检测器输出的逐帧检测点
/// - Frames:     已解码视频帧, 单向顺序读取
pub mod detections;
pub mod frames;

pub use detections::{CsvDetections, DetectionSource};
pub use frames::{Frame, FrameSource, ImageSequence, MemoryFrames};
