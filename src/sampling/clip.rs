//! 运动片段采样 (Clip sampling)
//!
//! 单次顺序扫描视频: 每帧查出所有在该帧有检测点的轨迹,
//! 以检测点为中心裁剪 64×64 (边缘复制), 每条轨迹收满 32 帧即停止。
//! 扫描结束后不足 32 帧的轨迹重复最后一帧补齐。

use std::collections::BTreeMap;

use image::RgbImage;
use ndarray::{Array3, Array4, Array5, Axis};
use tracing::{debug, info, warn};

use crate::config::{CLIP_CROP_SIZE, CLIP_LENGTH};
use crate::error::Result;
use crate::input::{Frame, FrameSource};
use crate::tracking::{ParticleId, TrajectorySet};
use crate::utils::crop;

/// 单个粒子的运动片段: [T, H, W, C] = [32, 64, 64, 3], 取值 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub particle_id: ParticleId,
    frames: Array4<f32>,
}

impl Clip {
    pub fn frames(&self) -> &Array4<f32> {
        &self.frames
    }

    /// 帧数 (恒为 CLIP_LENGTH)
    pub fn len(&self) -> usize {
        self.frames.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 全部片段 + 未能采样的粒子
#[derive(Debug, Clone, Default)]
pub struct ClipSet {
    clips: BTreeMap<ParticleId, Clip>,
    omitted: Vec<ParticleId>,
}

impl ClipSet {
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, id: ParticleId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clip> {
        self.clips.values()
    }

    pub fn ids(&self) -> Vec<ParticleId> {
        self.clips.keys().copied().collect()
    }

    /// 没有产出任何裁剪的粒子
    pub fn omitted(&self) -> &[ParticleId] {
        &self.omitted
    }

    /// 组装批量输入 [N, 32, 64, 64, 3]
    pub fn batch(&self, ids: &[ParticleId]) -> Array5<f32> {
        let size = CLIP_CROP_SIZE as usize;
        let mut batch = Array5::<f32>::zeros((ids.len(), CLIP_LENGTH, size, size, 3));
        for (i, id) in ids.iter().enumerate() {
            if let Some(clip) = self.clips.get(id) {
                batch.index_axis_mut(Axis(0), i).assign(&clip.frames);
            }
        }
        batch
    }
}

/// 待裁剪位置
#[derive(Debug, Clone, Copy)]
struct PlannedCrop {
    particle_id: ParticleId,
    x: f32,
    y: f32,
}

/// 片段采样器
pub struct ClipSampler {
    /// 帧号 → 该帧需要裁剪的粒子
    plan: BTreeMap<u32, Vec<PlannedCrop>>,
    /// 已收集的裁剪
    crops: BTreeMap<ParticleId, Vec<Array3<f32>>>,
}

impl ClipSampler {
    pub fn new(set: &TrajectorySet) -> Self {
        let mut plan: BTreeMap<u32, Vec<PlannedCrop>> = BTreeMap::new();
        for traj in set.iter() {
            // 全部检测点入计划: 越界的检测点不产出裁剪, 需要后续帧补上
            for det in traj.detections() {
                plan.entry(det.frame).or_default().push(PlannedCrop {
                    particle_id: traj.particle_id(),
                    x: det.x,
                    y: det.y,
                });
            }
        }

        Self {
            plan,
            crops: set.ids().map(|id| (id, Vec::new())).collect(),
        }
    }

    /// 是否已无待处理帧 (可提前结束扫描)
    pub fn is_done(&self) -> bool {
        self.plan.is_empty()
    }

    /// 处理一帧
    pub fn observe(&mut self, frame: &Frame) {
        let Some(planned) = self.plan.remove(&frame.index) else {
            return;
        };
        let (width, height) = frame.image.dimensions();
        let mut full = Vec::new();

        for p in planned {
            let Some(crops) = self.crops.get_mut(&p.particle_id) else {
                continue;
            };
            if crops.len() >= CLIP_LENGTH {
                continue;
            }
            if !crop::contains(width, height, p.x, p.y) {
                debug!(particle = p.particle_id, frame = frame.index, "crop center outside frame");
                continue;
            }
            let patch = crop::crop_centered(&frame.image, p.x, p.y, CLIP_CROP_SIZE);
            crops.push(normalize(&patch));
            if crops.len() == CLIP_LENGTH {
                full.push(p.particle_id);
            }
        }

        if !full.is_empty() {
            self.prune(&full);
        }
    }

    /// 收满的粒子从剩余计划中移除, 空帧一并移除
    fn prune(&mut self, full: &[ParticleId]) {
        self.plan.retain(|_, planned| {
            planned.retain(|p| !full.contains(&p.particle_id));
            !planned.is_empty()
        });
    }

    /// 结束扫描, 补齐并输出片段
    pub fn finish(self) -> ClipSet {
        let mut clips = BTreeMap::new();
        let mut omitted = Vec::new();

        for (particle_id, mut crops) in self.crops {
            let Some(last) = crops.last().cloned() else {
                warn!("⚠️ 粒子 {} 无可用裁剪, 不参与运动分类", particle_id);
                omitted.push(particle_id);
                continue;
            };
            // 时间维补齐: 重复最后一帧
            while crops.len() < CLIP_LENGTH {
                crops.push(last.clone());
            }

            let views: Vec<_> = crops.iter().map(|c| c.view()).collect();
            let Ok(frames) = ndarray::stack(Axis(0), &views) else {
                omitted.push(particle_id);
                continue;
            };
            clips.insert(particle_id, Clip { particle_id, frames });
        }

        info!("🎞️ 运动片段: {} 个, 跳过 {} 个", clips.len(), omitted.len());
        ClipSet { clips, omitted }
    }

    /// 独立单次扫描
    pub fn sample<S: FrameSource>(set: &TrajectorySet, mut source: S) -> Result<ClipSet> {
        let mut sampler = ClipSampler::new(set);
        while !sampler.is_done() {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            sampler.observe(&frame);
        }
        Ok(sampler.finish())
    }
}

/// RGB 裁剪 → [H, W, 3] 浮点, 除以255
fn normalize(patch: &RgbImage) -> Array3<f32> {
    let (w, h) = patch.dimensions();
    Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, c)| {
        patch.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}
