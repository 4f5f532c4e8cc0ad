//! 采样模块: 运动片段 + 形态轮廓
pub mod clip;
pub mod silhouette;

pub use clip::{Clip, ClipSampler, ClipSet};
pub use silhouette::{
    Component, LargestArea, NearestToCenter, Segmenter, Silhouette, SilhouetteExtractor,
    SilhouetteKind, SilhouetteSet, TargetSelector,
};
