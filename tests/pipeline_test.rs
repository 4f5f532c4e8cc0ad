use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayD};

use motility_rs::input::{CsvDetections, DetectionSource, Frame, FrameSource, ImageSequence};
use motility_rs::report::{write_particle_table, write_report_json};
use motility_rs::tracking::{read_table, write_table};
use motility_rs::{
    track, AnalysisError, Analyzer, MotionClassifier, MotionLabel, PipelineConfig, ScoreFn,
    ShapeClassifier, ShapeLabel,
};

const WIDTH: u32 = 160;
const HEIGHT: u32 = 120;
const FRAMES: u32 = 40;

/// 三个静止粒子 + 一个每帧右移 2px 的粒子
fn position(particle: u32, frame: u32) -> (f32, f32) {
    let y = 20.0 + 25.0 * particle as f32;
    let x = if particle == 3 { 20.0 + 2.0 * frame as f32 } else { 20.0 };
    (x, y)
}

/// 明亮背景上的高斯暗斑
fn render(frame: u32) -> RgbImage {
    let centers: Vec<_> = (0..4).map(|p| position(p, frame)).collect();
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let darkest = centers
            .iter()
            .map(|&(cx, cy)| {
                let r2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                180.0 * (-r2 / (2.0 * 2.3 * 2.3)).exp()
            })
            .fold(0.0f32, f32::max);
        let v = (210.0 - darkest).round() as u8;
        Rgb([v, v, v])
    })
}

fn fixed_scorer(cols: usize, row: Vec<f32>) -> ScoreFn<impl FnMut(ArrayD<f32>) -> anyhow::Result<Array2<f32>> + Send> {
    ScoreFn(move |batch: ArrayD<f32>| -> anyhow::Result<Array2<f32>> {
        let n = batch.shape()[0];
        Ok(Array2::from_shape_fn((n, cols), |(_, c)| row[c]))
    })
}

#[test]
fn test_end_to_end_report() {
    let dir = tempfile::tempdir().unwrap();

    // 检测点 CSV (mass 列)
    let det_path = dir.path().join("detections.csv");
    let mut file = std::fs::File::create(&det_path).unwrap();
    writeln!(file, "frame,x,y,mass").unwrap();
    for f in 0..FRAMES {
        for p in 0..4 {
            let (x, y) = position(p, f);
            writeln!(file, "{},{},{},100", f, x, y).unwrap();
        }
    }
    drop(file);

    // 帧序列
    let frames_dir = dir.path().join("frames");
    std::fs::create_dir(&frames_dir).unwrap();
    for f in 0..FRAMES {
        render(f).save(frames_dir.join(format!("frame_{:04}.png", f))).unwrap();
    }

    // 阶段一 + 轨迹表往返
    let config = PipelineConfig::default();
    let detections = CsvDetections::new(&det_path).detections().unwrap();
    let tracked = track(detections, &config).unwrap();
    assert_eq!(tracked.trajectories.len(), 4);
    assert!(tracked.drift.as_ref().unwrap().max_magnitude() < 1e-6);

    let table = dir.path().join("final_tracks.csv");
    write_table(&tracked.trajectories, &table).unwrap();
    let set = read_table(&table).unwrap();
    assert_eq!(set, tracked.trajectories);

    // 阶段二
    let motion = MotionClassifier::new(Box::new(fixed_scorer(3, vec![0.1, 0.2, 0.7])), Some(3));
    let shape = ShapeClassifier::new(Box::new(fixed_scorer(1, vec![0.2])), 0.5, None);
    let mut analyzer = Analyzer::new(config)
        .with_motion_classifier(motion)
        .with_shape_classifier(shape);
    let outcome = analyzer
        .analyze(&set, ImageSequence::open(&frames_dir).unwrap())
        .unwrap();

    assert_eq!(outcome.motion.len(), 4);
    assert!(outcome.motion.iter().all(|r| r.label == MotionLabel::Progressive));
    assert_eq!(outcome.shape.len(), 4);
    assert!(outcome.shape.iter().all(|r| r.label == ShapeLabel::Normal));

    let mover = outcome.kinematics.iter().find(|k| k.mean_velocity > 0.0).unwrap();
    assert!((mover.mean_velocity - 60.0).abs() < 1e-3);
    assert!((mover.linearity - 1.0).abs() < 1e-6);
    assert_eq!(outcome.kinematics.iter().filter(|k| k.mean_velocity == 0.0).count(), 3);

    // 输出
    let report_path = dir.path().join("report.json");
    write_report_json(&outcome.report, &report_path).unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["trajectories"], 4);
    assert_eq!(json["motility"]["counts"]["PR"], 4);
    assert_eq!(json["motility"]["diagnosis"], "fertile-pattern");
    assert_eq!(json["morphology"]["diagnosis"], "normal");
    assert_eq!(json["verdict"], "both-normal");
    assert_eq!(json["omissions"]["no_target"], 0);
    assert_eq!(json["omissions"]["without_clip"], 0);

    let particles_path = dir.path().join("particles.csv");
    write_particle_table(&outcome.particle_records(), &particles_path).unwrap();
    let text = std::fs::read_to_string(&particles_path).unwrap();
    assert_eq!(text.lines().count(), 5);
    assert!(text.lines().skip(1).all(|l| l.contains(",PR,") && l.contains(",normal,")));

    let preview = outcome.preview(&set).unwrap();
    assert_eq!(preview.dimensions(), (WIDTH, HEIGHT));
}

/// 第 `fail_at` 帧解码失败的帧源, drop 时记录
struct FlakySource {
    next: u32,
    fail_at: u32,
    dropped: Arc<AtomicBool>,
}

impl FrameSource for FlakySource {
    fn next_frame(&mut self) -> motility_rs::Result<Option<Frame>> {
        if self.next == self.fail_at {
            return Err(AnalysisError::Decode(format!("corrupt frame {}", self.next)));
        }
        let index = self.next;
        self.next += 1;
        Ok(Some(Frame {
            index,
            image: render(index),
        }))
    }
}

impl Drop for FlakySource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_decode_failure_releases_source() {
    let detections = (0..FRAMES)
        .flat_map(|f| (0..4).map(move |p| {
            let (x, y) = position(p, f);
            motility_rs::Detection::new(f, x, y, 1.0)
        }))
        .collect();
    let set = track(detections, &PipelineConfig::default()).unwrap().trajectories;

    let dropped = Arc::new(AtomicBool::new(false));
    let source = FlakySource {
        next: 0,
        fail_at: 5,
        dropped: dropped.clone(),
    };
    let motion = MotionClassifier::new(Box::new(fixed_scorer(3, vec![1.0, 0.0, 0.0])), None);
    let mut analyzer = Analyzer::new(PipelineConfig::default()).with_motion_classifier(motion);

    let err = analyzer.analyze(&set, source).unwrap_err();
    assert!(matches!(err, AnalysisError::Decode(_)));
    assert!(dropped.load(Ordering::SeqCst));
}
