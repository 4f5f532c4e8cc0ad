// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// ONNX Runtime 打分后端 (需要 `onnx` 功能)
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::{debug, info};

use super::ScoringFunction;

pub struct OrtScorer {
    session: Session,
    name: String,
}

impl OrtScorer {
    /// 加载 ONNX 模型
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)
            .with_context(|| format!("加载模型失败: {}", path.display()))?;

        info!("✅ 模型已加载: {}", path.display());
        Ok(Self {
            session,
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "onnx".to_string()),
        })
    }
}

impl ScoringFunction for OrtScorer {
    fn score(&mut self, batch: ArrayD<f32>) -> Result<Array2<f32>> {
        let shape: Vec<i64> = batch.shape().iter().map(|&d| d as i64).collect();
        let rows = batch.shape()[0];
        let data: Vec<f32> = batch.iter().copied().collect();
        let input = Tensor::from_array((shape, data))?;

        let outputs = self.session.run(ort::inputs![input])?;
        let (out_shape, probs) = outputs[0].try_extract_tensor::<f32>()?;
        debug!(model = %self.name, ?out_shape, "inference done");

        if rows == 0 || probs.len() % rows != 0 {
            anyhow::bail!("output of {} values cannot be split into {} rows", probs.len(), rows);
        }
        let cols = probs.len() / rows;
        Ok(Array2::from_shape_vec((rows, cols), probs.to_vec())?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
