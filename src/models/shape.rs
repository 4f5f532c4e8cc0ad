// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 形态分类器: 轮廓 [N, 224, 224, 3] → normal / abnormal
///
/// 打分函数输出 P(abnormal): 单列直接取值, 双列取最后一列。
/// P(abnormal) < threshold 判为 normal。
use ndarray::{Array4, Axis};
use tracing::info;

use super::{score_in_batches, ClassificationResult, ScoringFunction, ShapeLabel};
use crate::config::SILHOUETTE_SIZE;
use crate::error::{AnalysisError, Result};
use crate::tracking::ParticleId;

const AXIS: &str = "shape";

pub struct ShapeClassifier {
    scorer: Box<dyn ScoringFunction>,
    threshold: f32,
    batch_size: Option<usize>,
}

impl ShapeClassifier {
    pub fn new(scorer: Box<dyn ScoringFunction>, threshold: f32, batch_size: Option<usize>) -> Self {
        Self {
            scorer,
            threshold,
            batch_size,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// 批量分类, 结果与 `ids` 一一对应
    pub fn classify(
        &mut self,
        ids: &[ParticleId],
        silhouettes: Array4<f32>,
    ) -> Result<Vec<ClassificationResult<ShapeLabel>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let size = SILHOUETTE_SIZE as usize;
        let expected = [ids.len(), size, size, 3];
        if silhouettes.shape() != &expected[..] {
            return Err(AnalysisError::classifier(
                AXIS,
                format!("expected input {:?}, got {:?}", expected, silhouettes.shape()),
            ));
        }

        let probs = score_in_batches(
            self.scorer.as_mut(),
            AXIS,
            silhouettes.into_dyn(),
            self.batch_size,
            |cols| cols == 1 || cols == 2,
        )?;

        let last = probs.ncols() - 1;
        let results: Vec<_> = ids
            .iter()
            .zip(probs.index_axis(Axis(1), last).iter())
            .map(|(&particle_id, &p_abnormal)| self.decide(particle_id, p_abnormal))
            .collect();

        let abnormal = results.iter().filter(|r| r.label == ShapeLabel::Abnormal).count();
        info!("🧫 形态分类完成: {} 个粒子 (异常 {})", results.len(), abnormal);
        Ok(results)
    }

    fn decide(&self, particle_id: ParticleId, p_abnormal: f32) -> ClassificationResult<ShapeLabel> {
        let p = p_abnormal.clamp(0.0, 1.0);
        if p < self.threshold {
            ClassificationResult {
                particle_id,
                label: ShapeLabel::Normal,
                confidence: 1.0 - p,
            }
        } else {
            ClassificationResult {
                particle_id,
                label: ShapeLabel::Abnormal,
                confidence: p,
            }
        }
    }
}
