// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 运动分类器: 片段 [N, 32, 64, 64, 3] → IM / NP / PR
use ndarray::{Array5, ArrayView1, Axis};
use tracing::info;

use super::{score_in_batches, ClassificationResult, Label, MotionLabel, ScoringFunction};
use crate::config::{CLIP_CROP_SIZE, CLIP_LENGTH};
use crate::error::{AnalysisError, Result};
use crate::tracking::ParticleId;

const AXIS: &str = "motion";

pub struct MotionClassifier {
    scorer: Box<dyn ScoringFunction>,
    batch_size: Option<usize>,
}

impl MotionClassifier {
    pub fn new(scorer: Box<dyn ScoringFunction>, batch_size: Option<usize>) -> Self {
        Self { scorer, batch_size }
    }

    /// 批量分类, 结果与 `ids` 一一对应
    ///
    /// 空输入直接返回, 不调用打分函数。
    pub fn classify(
        &mut self,
        ids: &[ParticleId],
        clips: Array5<f32>,
    ) -> Result<Vec<ClassificationResult<MotionLabel>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let size = CLIP_CROP_SIZE as usize;
        let expected = [ids.len(), CLIP_LENGTH, size, size, 3];
        if clips.shape() != &expected[..] {
            return Err(AnalysisError::classifier(
                AXIS,
                format!("expected input {:?}, got {:?}", expected, clips.shape()),
            ));
        }

        let probs = score_in_batches(
            self.scorer.as_mut(),
            AXIS,
            clips.into_dyn(),
            self.batch_size,
            |cols| cols == MotionLabel::ALL.len(),
        )?;

        let results: Vec<_> = ids
            .iter()
            .zip(probs.axis_iter(Axis(0)))
            .map(|(&particle_id, row)| {
                let (idx, confidence) = argmax(row);
                ClassificationResult {
                    particle_id,
                    label: MotionLabel::ALL[idx],
                    confidence,
                }
            })
            .collect();

        info!("🏃 运动分类完成: {} 个粒子", results.len());
        Ok(results)
    }
}

/// 最大概率下标 (并列取最小下标)
fn argmax(row: ArrayView1<f32>) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, &p) in row.iter().enumerate() {
        if p > best.1 {
            best = (i, p);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreFn;
    use ndarray::{arr2, Array2, ArrayD};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn clips(n: usize) -> Array5<f32> {
        Array5::zeros((n, CLIP_LENGTH, 64, 64, 3))
    }

    fn fixed(rows: Array2<f32>) -> Box<dyn ScoringFunction> {
        Box::new(ScoreFn(move |batch: ArrayD<f32>| -> anyhow::Result<Array2<f32>> {
            let n = batch.shape()[0];
            Ok(rows.slice(ndarray::s![..n, ..]).to_owned())
        }))
    }

    #[test]
    fn test_argmax_labels() {
        let probs = arr2(&[[0.1, 0.2, 0.7], [0.6, 0.3, 0.1], [0.2, 0.5, 0.3]]);
        let mut classifier = MotionClassifier::new(fixed(probs), None);
        let results = classifier.classify(&[4, 7, 9], clips(3)).unwrap();

        let labels: Vec<_> = results.iter().map(|r| r.label).collect();
        assert_eq!(
            labels,
            vec![MotionLabel::Progressive, MotionLabel::Immotile, MotionLabel::NonProgressive]
        );
        assert_eq!(results[1].particle_id, 7);
        assert!((results[0].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_tie_takes_lowest_index() {
        let probs = arr2(&[[0.4, 0.4, 0.2], [0.2, 0.4, 0.4], [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0]]);
        let mut classifier = MotionClassifier::new(fixed(probs), None);
        let results = classifier.classify(&[0, 1, 2], clips(3)).unwrap();
        assert_eq!(results[0].label, MotionLabel::Immotile);
        assert_eq!(results[1].label, MotionLabel::NonProgressive);
        assert_eq!(results[2].label, MotionLabel::Immotile);
    }

    #[test]
    fn test_empty_input_skips_scorer() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let scorer = ScoreFn(move |_batch: ArrayD<f32>| -> anyhow::Result<Array2<f32>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Array2::zeros((0, 3)))
        });
        let mut classifier = MotionClassifier::new(Box::new(scorer), None);
        let results = classifier.classify(&[], clips(0)).unwrap();
        assert!(results.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wrong_column_count_is_classifier_error() {
        let mut classifier = MotionClassifier::new(fixed(arr2(&[[0.5, 0.5]])), None);
        let err = classifier.classify(&[0], clips(1)).unwrap_err();
        assert!(matches!(err, AnalysisError::Classifier { axis: "motion", .. }));
    }

    #[test]
    fn test_scorer_failure_is_classifier_error() {
        let scorer = ScoreFn(|_batch: ArrayD<f32>| -> anyhow::Result<Array2<f32>> {
            anyhow::bail!("session crashed")
        });
        let mut classifier = MotionClassifier::new(Box::new(scorer), None);
        let err = classifier.classify(&[0], clips(1)).unwrap_err();
        assert!(err.to_string().contains("session crashed"));
    }

    #[test]
    fn test_batch_size_does_not_change_results() {
        // 按片段第一个像素编码类别
        let scorer = || {
            Box::new(ScoreFn(|batch: ArrayD<f32>| -> anyhow::Result<Array2<f32>> {
                let n = batch.shape()[0];
                Ok(Array2::from_shape_fn((n, 3), |(i, c)| {
                    let class = batch[[i, 0, 0, 0, 0]] as usize;
                    if c == class { 0.8 } else { 0.1 }
                }))
            })) as Box<dyn ScoringFunction>
        };
        let mut input = clips(5);
        for i in 0..5 {
            input[[i, 0, 0, 0, 0]] = (i % 3) as f32;
        }
        let ids = [0, 1, 2, 3, 4];

        let whole = MotionClassifier::new(scorer(), None)
            .classify(&ids, input.clone())
            .unwrap();
        let chunked = MotionClassifier::new(scorer(), Some(2))
            .classify(&ids, input)
            .unwrap();
        assert_eq!(whole, chunked);
        assert_eq!(whole[4].label, MotionLabel::NonProgressive);
    }
}
