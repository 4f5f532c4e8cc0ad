//! 精子活力/形态分析 - 命令行入口
//!
//! cargo run --bin motility -- track -d detections.csv
//! cargo run --bin motility --features onnx -- run -d detections.csv -f frames/ \
//!     --motion-model models/motion.onnx --shape-model models/shape.onnx
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use motility_rs::config::{AnalysisArgs, Args, Command};
use motility_rs::input::{CsvDetections, DetectionSource, ImageSequence};
use motility_rs::report::{write_particle_table, write_report_json};
use motility_rs::tracking::{read_table, write_table, TrajectorySet};
use motility_rs::{track, Analyzer, PipelineConfig};

/// 无可分析对象 (无检测点 / 无合格轨迹) 时的退出码
const EXIT_NOTHING_TO_ANALYZE: u8 = 2;

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    println!("🔬 motility-rs | 精子活力与形态分析");

    let outcome = match args.command {
        Command::Track { detections, output } => {
            tracking_stage(&detections, &config).and_then(|set| {
                write_table(&set, &output)?;
                Ok(())
            })
        }
        Command::Analyze { tracks, analysis } => {
            read_table(&tracks).and_then(|set| analysis_stage(&set, &analysis, config))
        }
        Command::Run {
            detections,
            tracks_out,
            analysis,
        } => tracking_stage(&detections, &config).and_then(|set| {
            write_table(&set, &tracks_out)?;
            analysis_stage(&set, &analysis, config)
        }),
    };

    exit_status(outcome).map(ExitCode::from)
}

/// 运行结果 → 进程退出码, 其余错误原样上抛
fn exit_status(outcome: motility_rs::Result<()>) -> Result<u8> {
    match outcome {
        Ok(()) => {
            println!("✅ 完成");
            Ok(0)
        }
        Err(e) if e.is_nothing_to_analyze() => {
            println!("⚠️ 无可分析对象: {}", e);
            Ok(EXIT_NOTHING_TO_ANALYZE)
        }
        Err(e) => Err(e.into()),
    }
}

/// 检测点 → 轨迹
fn tracking_stage(path: &std::path::Path, config: &PipelineConfig) -> motility_rs::Result<TrajectorySet> {
    println!("📍 轨迹关联: {}", path.display());
    let detections = CsvDetections::new(path).detections()?;
    Ok(track(detections, config)?.trajectories)
}

/// 轨迹 + 视频帧 → 报告
fn analysis_stage(
    set: &TrajectorySet,
    args: &AnalysisArgs,
    config: PipelineConfig,
) -> motility_rs::Result<()> {
    println!("🧪 分析: {} 条轨迹, 帧目录 {}", set.len(), args.frames.display());

    let mut analyzer = build_analyzer(args, config)?;
    let frames = ImageSequence::open(&args.frames)?;
    let outcome = analyzer.analyze(set, frames)?;

    write_report_json(&outcome.report, &args.report)?;
    if let Some(path) = &args.particles {
        write_particle_table(&outcome.particle_records(), path)?;
    }
    if let Some(path) = &args.preview {
        match outcome.preview(set) {
            Some(image) => image
                .save(path)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?,
            None => warn!("⚠️ 没有可用的帧, 跳过预览图"),
        }
    }

    println!(
        "📊 活力: {:?} | 形态: {:?} | 结论: {:?}",
        outcome.report.motility.diagnosis, outcome.report.morphology.diagnosis, outcome.report.verdict
    );
    Ok(())
}

#[cfg(feature = "onnx")]
fn build_analyzer(args: &AnalysisArgs, config: PipelineConfig) -> motility_rs::Result<Analyzer> {
    use motility_rs::models::OrtScorer;
    use motility_rs::{AnalysisError, MotionClassifier, ShapeClassifier};

    let load = |axis: &'static str, path: &std::path::Path| {
        OrtScorer::load(path).map_err(|e| AnalysisError::Classifier {
            axis,
            reason: format!("{:#}", e),
        })
    };

    let batch_size = config.classifier.batch_size;
    let threshold = config.classifier.shape_threshold;
    let mut analyzer = Analyzer::new(config);
    if let Some(path) = &args.motion_model {
        analyzer = analyzer.with_motion_classifier(MotionClassifier::new(
            Box::new(load("motion", path)?),
            batch_size,
        ));
    }
    if let Some(path) = &args.shape_model {
        analyzer = analyzer.with_shape_classifier(ShapeClassifier::new(
            Box::new(load("shape", path)?),
            threshold,
            batch_size,
        ));
    }
    Ok(analyzer)
}

#[cfg(not(feature = "onnx"))]
fn build_analyzer(args: &AnalysisArgs, config: PipelineConfig) -> motility_rs::Result<Analyzer> {
    if args.motion_model.is_some() || args.shape_model.is_some() {
        warn!("⚠️ 未启用 onnx 功能, 忽略模型参数 (cargo run --features onnx)");
    }
    Ok(Analyzer::new(config))
}
