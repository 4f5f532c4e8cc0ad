/// 轨迹叠加图 (Track overlay)
///
/// 颜色: PR 绿, NP 黄, IM 红; 未分类粒子按ID取黄金角色相。
use std::collections::BTreeMap;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::models::MotionLabel;
use crate::tracking::{ParticleId, TrajectorySet};

/// 轨迹头部圆点半径
const HEAD_RADIUS: i32 = 2;

/// 运动类别颜色
pub fn label_color(label: MotionLabel) -> Rgb<u8> {
    match label {
        MotionLabel::Progressive => Rgb([0, 255, 0]),
        MotionLabel::NonProgressive => Rgb([255, 255, 0]),
        MotionLabel::Immotile => Rgb([255, 0, 0]),
    }
}

/// 根据ID生成颜色
pub fn id_to_color(id: ParticleId) -> Rgb<u8> {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    let (r, g, b) = hsv_to_rgb(hue, 0.8, 0.9);
    Rgb([r, g, b])
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

/// 在帧副本上绘制截至 `up_to_frame` 的全部轨迹
pub fn render_tracks(
    frame: &RgbImage,
    set: &TrajectorySet,
    up_to_frame: u32,
    labels: &BTreeMap<ParticleId, MotionLabel>,
) -> RgbImage {
    let mut canvas = frame.clone();

    for traj in set.iter() {
        let color = labels
            .get(&traj.particle_id())
            .map(|&l| label_color(l))
            .unwrap_or_else(|| id_to_color(traj.particle_id()));

        let visible: Vec<(f32, f32)> = traj
            .detections()
            .iter()
            .take_while(|d| d.frame <= up_to_frame)
            .map(|d| (d.x, d.y))
            .collect();

        for w in visible.windows(2) {
            draw_line_segment_mut(&mut canvas, w[0], w[1], color);
        }
        if let Some(&(x, y)) = visible.last() {
            draw_filled_circle_mut(&mut canvas, (x.round() as i32, y.round() as i32), HEAD_RADIUS, color);
        }
    }

    canvas
}
