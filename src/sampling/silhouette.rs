//! 形态轮廓提取 (Silhouette extraction)
//!
//! 流程:
//! 1. 每条轨迹取信号最强的检测点所在帧 (最佳帧)
//! 2. 裁剪 → 灰度 → 缩放到 224×224
//! 3. 自适应高斯阈值 (反向二值) → 腐蚀 → 开运算
//! 4. 连通域中选出目标细胞 (默认: 质心离图像中心最近)
//! 5. 填充外轮廓内部 → 闭运算 → 反相 (白底黑细胞)
//!
//! 找不到任何连通域时返回全白的 "无目标" 图像, 该粒子形态记为不可用。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, erode, open};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::{Array3, Array4, Axis};
use tracing::{debug, info, warn};

use crate::config::{SilhouetteConfig, SILHOUETTE_SIZE};
use crate::error::Result;
use crate::input::{Frame, FrameSource};
use crate::tracking::{ParticleId, TrajectorySet};
use crate::utils::crop;

// ========== 目标选择策略 ==========

/// 二值图中的一个连通域
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    pub label: u32,
    pub area: u32,
    /// 质心 (x, y)
    pub centroid: (f32, f32),
}

/// 目标连通域选择策略
///
/// `components` 按扫描时首次出现的顺序排列, 返回选中的下标。
pub trait TargetSelector: Send + Sync {
    fn select(&self, components: &[Component], width: u32, height: u32) -> Option<usize>;
}

/// 质心离图像中心最近 (并列取先出现者)
#[derive(Debug, Default, Clone, Copy)]
pub struct NearestToCenter;

impl TargetSelector for NearestToCenter {
    fn select(&self, components: &[Component], width: u32, height: u32) -> Option<usize> {
        let cx = (width / 2) as f32;
        let cy = (height / 2) as f32;
        let mut best: Option<(usize, f32)> = None;
        for (idx, c) in components.iter().enumerate() {
            let dist = ((c.centroid.0 - cx).powi(2) + (c.centroid.1 - cy).powi(2)).sqrt();
            if best.map_or(true, |(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

/// 面积最大 (并列取先出现者)
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestArea;

impl TargetSelector for LargestArea {
    fn select(&self, components: &[Component], _width: u32, _height: u32) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (idx, c) in components.iter().enumerate() {
            if best.map_or(true, |(_, a)| c.area > a) {
                best = Some((idx, c.area));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

// ========== 分割 ==========

/// 二值分割器
pub struct Segmenter {
    config: SilhouetteConfig,
    selector: Arc<dyn TargetSelector>,
}

impl Segmenter {
    pub fn new(config: SilhouetteConfig) -> Self {
        Self {
            config,
            selector: Arc::new(NearestToCenter),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn TargetSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// 灰度图 → 目标轮廓 (白底黑目标), 无连通域返回 None
    pub fn segment(&self, gray: &GrayImage) -> Option<GrayImage> {
        let (width, height) = gray.dimensions();

        let binary = self.adaptive_threshold(gray);
        let binary = erode(&binary, Norm::L1, self.config.erode_radius);
        let binary = open(&binary, Norm::L1, self.config.open_radius);

        let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));
        let components = collect_components(&labels);
        let index = self.selector.select(&components, width, height)?;
        let Some(&target) = components.get(index) else {
            warn!("⚠️ 目标选择器返回越界下标 {} (共 {} 个连通域)", index, components.len());
            return None;
        };
        debug!(
            label = target.label,
            area = target.area,
            candidates = components.len(),
            "selected target component"
        );

        let mask = GrayImage::from_fn(width, height, |x, y| {
            if labels.get_pixel(x, y)[0] == target.label {
                Luma([255])
            } else {
                Luma([0])
            }
        });

        let filled = fill_holes(&mask);
        let mut closed = close(&filled, Norm::L1, self.config.close_radius);
        imageops::invert(&mut closed);
        Some(closed)
    }

    /// 自适应高斯阈值 (反向): 比局部加权均值暗 `offset` 以上的像素为前景
    fn adaptive_threshold(&self, gray: &GrayImage) -> GrayImage {
        let local_mean = gaussian_blur_f32(gray, self.config.blur_sigma);
        GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let src = gray.get_pixel(x, y)[0] as i16;
            let mean = local_mean.get_pixel(x, y)[0] as i16;
            if src <= mean - self.config.offset {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

/// 按首次出现顺序统计连通域面积与质心
fn collect_components(labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>) -> Vec<Component> {
    let mut order: Vec<u32> = Vec::new();
    let mut stats: BTreeMap<u32, (u64, f64, f64)> = BTreeMap::new();

    for (x, y, px) in labels.enumerate_pixels() {
        let label = px[0];
        if label == 0 {
            continue;
        }
        let entry = stats.entry(label).or_insert_with(|| {
            order.push(label);
            (0, 0.0, 0.0)
        });
        entry.0 += 1;
        entry.1 += x as f64;
        entry.2 += y as f64;
    }

    order
        .into_iter()
        .map(|label| {
            let (n, sx, sy) = stats[&label];
            Component {
                label,
                area: n as u32,
                centroid: ((sx / n as f64) as f32, (sy / n as f64) as f32),
            }
        })
        .collect()
}

/// 填充外轮廓内部: 不与图像边界连通的背景区域视为孔洞
fn fill_holes(mask: &GrayImage) -> GrayImage {
    let mut background = mask.clone();
    imageops::invert(&mut background);
    // 前景按8连通, 背景按4连通
    let regions = connected_components(&background, Connectivity::Four, Luma([0u8]));

    let (width, height) = mask.dimensions();
    let mut outside = BTreeSet::new();
    for x in 0..width {
        outside.insert(regions.get_pixel(x, 0)[0]);
        outside.insert(regions.get_pixel(x, height - 1)[0]);
    }
    for y in 0..height {
        outside.insert(regions.get_pixel(0, y)[0]);
        outside.insert(regions.get_pixel(width - 1, y)[0]);
    }

    GrayImage::from_fn(width, height, |x, y| {
        let region = regions.get_pixel(x, y)[0];
        if mask.get_pixel(x, y)[0] > 0 || !outside.contains(&region) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

// ========== 轮廓图 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilhouetteKind {
    Target,
    /// 无连通域: 全白占位图, 形态不可用
    NoTarget,
}

/// 单个粒子的形态轮廓图 (224×224)
#[derive(Debug, Clone, PartialEq)]
pub struct Silhouette {
    pub particle_id: ParticleId,
    pub kind: SilhouetteKind,
    image: GrayImage,
}

impl Silhouette {
    pub fn no_target(particle_id: ParticleId) -> Self {
        Self {
            particle_id,
            kind: SilhouetteKind::NoTarget,
            image: GrayImage::from_pixel(SILHOUETTE_SIZE, SILHOUETTE_SIZE, Luma([255])),
        }
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn has_target(&self) -> bool {
        self.kind == SilhouetteKind::Target
    }

    /// [H, W, 3] 浮点张量 (灰度复制到三通道), 取值 [0, 1]
    pub fn to_tensor(&self) -> Array3<f32> {
        let (w, h) = self.image.dimensions();
        Array3::from_shape_fn((h as usize, w as usize, 3), |(y, x, _)| {
            self.image.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SilhouetteSet {
    silhouettes: BTreeMap<ParticleId, Silhouette>,
    omitted: Vec<ParticleId>,
}

impl SilhouetteSet {
    pub fn len(&self) -> usize {
        self.silhouettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.silhouettes.is_empty()
    }

    pub fn get(&self, id: ParticleId) -> Option<&Silhouette> {
        self.silhouettes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Silhouette> {
        self.silhouettes.values()
    }

    /// 找到目标的粒子ID
    pub fn target_ids(&self) -> Vec<ParticleId> {
        self.iter().filter(|s| s.has_target()).map(|s| s.particle_id).collect()
    }

    pub fn no_target_count(&self) -> usize {
        self.iter().filter(|s| !s.has_target()).count()
    }

    /// 最佳帧无法裁剪的粒子
    pub fn omitted(&self) -> &[ParticleId] {
        &self.omitted
    }

    /// 组装批量输入 [N, 224, 224, 3]
    pub fn batch(&self, ids: &[ParticleId]) -> Array4<f32> {
        let size = SILHOUETTE_SIZE as usize;
        let mut batch = Array4::<f32>::zeros((ids.len(), size, size, 3));
        for (i, id) in ids.iter().enumerate() {
            if let Some(s) = self.silhouettes.get(id) {
                batch.index_axis_mut(Axis(0), i).assign(&s.to_tensor());
            }
        }
        batch
    }
}

// ========== 提取器 ==========

#[derive(Debug, Clone, Copy)]
struct PlannedCrop {
    particle_id: ParticleId,
    x: f32,
    y: f32,
}

/// 形态轮廓提取器 (与片段采样共用一次扫描)
pub struct SilhouetteExtractor {
    segmenter: Segmenter,
    crop_size: u32,
    /// 帧号 → 最佳帧为该帧的粒子
    plan: BTreeMap<u32, Vec<PlannedCrop>>,
    pending: BTreeSet<ParticleId>,
    silhouettes: BTreeMap<ParticleId, Silhouette>,
}

impl SilhouetteExtractor {
    pub fn new(set: &TrajectorySet, config: &SilhouetteConfig) -> Self {
        let mut plan: BTreeMap<u32, Vec<PlannedCrop>> = BTreeMap::new();
        for traj in set.iter() {
            let best = traj.best_detection();
            plan.entry(best.frame).or_default().push(PlannedCrop {
                particle_id: traj.particle_id(),
                x: best.x,
                y: best.y,
            });
        }

        Self {
            segmenter: Segmenter::new(config.clone()),
            crop_size: config.crop_size,
            plan,
            pending: set.ids().collect(),
            silhouettes: BTreeMap::new(),
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn TargetSelector>) -> Self {
        self.segmenter = self.segmenter.with_selector(selector);
        self
    }

    pub fn is_done(&self) -> bool {
        self.plan.is_empty()
    }

    /// 处理一帧
    pub fn observe(&mut self, frame: &Frame) {
        let Some(planned) = self.plan.remove(&frame.index) else {
            return;
        };
        let (width, height) = frame.image.dimensions();

        for p in planned {
            if !crop::contains(width, height, p.x, p.y) {
                continue;
            }
            let patch = crop::crop_centered(&frame.image, p.x, p.y, self.crop_size);
            let gray = imageops::grayscale(&patch);
            let resized = imageops::resize(&gray, SILHOUETTE_SIZE, SILHOUETTE_SIZE, FilterType::Triangle);

            let silhouette = match self.segmenter.segment(&resized) {
                Some(image) => Silhouette {
                    particle_id: p.particle_id,
                    kind: SilhouetteKind::Target,
                    image,
                },
                None => {
                    warn!("⚠️ 粒子 {} 最佳帧无目标连通域, 形态不可用", p.particle_id);
                    Silhouette::no_target(p.particle_id)
                }
            };
            self.pending.remove(&p.particle_id);
            self.silhouettes.insert(p.particle_id, silhouette);
        }
    }

    pub fn finish(self) -> SilhouetteSet {
        let omitted: Vec<ParticleId> = self.pending.into_iter().collect();
        for id in &omitted {
            warn!("⚠️ 粒子 {} 最佳帧无法裁剪, 不参与形态分类", id);
        }
        let set = SilhouetteSet {
            silhouettes: self.silhouettes,
            omitted,
        };
        info!(
            "🧬 形态轮廓: {} 个 (无目标 {}), 跳过 {} 个",
            set.len(),
            set.no_target_count(),
            set.omitted.len()
        );
        set
    }

    /// 独立单次扫描
    pub fn sample<S: FrameSource>(
        set: &TrajectorySet,
        config: &SilhouetteConfig,
        mut source: S,
    ) -> Result<SilhouetteSet> {
        let mut extractor = SilhouetteExtractor::new(set, config);
        while !extractor.is_done() {
            let Some(frame) = source.next_frame()? else {
                break;
            };
            extractor.observe(&frame);
        }
        Ok(extractor.finish())
    }
}
