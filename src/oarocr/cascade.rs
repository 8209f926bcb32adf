//! Recognition cascade over recognizers of increasing capacity.
//!
//! Every line starts at the smallest recognizer (or a higher one when the
//! detector supplied a length hint). A result whose character count reaches
//! the escalation threshold of its tier may have been truncated, so the line is
//! read again by the next tier. The last tier's output is final.

use crate::core::config::ParallelPolicy;
use crate::core::errors::{OCRError, ProcessingStage};
use crate::core::traits::{Recognition, TextRecognizer};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Escalation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// `escalation_thresholds[t]` is the character count at which a tier `t`
    /// result is sent to tier `t + 1`.
    pub escalation_thresholds: Vec<usize>,
    /// Start lines at the tier suggested by the detector length hint.
    pub use_length_hints: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            escalation_thresholds: vec![25, 45],
            use_length_hints: false,
        }
    }
}

/// A line waiting for recognition.
#[derive(Debug, Clone)]
pub struct CascadeLine {
    /// Upright line image.
    pub image: RgbImage,
    /// Tier the line starts at.
    pub start_tier: usize,
}

/// Final reading of one line.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeOutcome {
    /// Recognized text and confidence.
    pub recognition: Recognition,
    /// Tier that produced the final text.
    pub tier: usize,
}

/// The recognizer tiers plus the bounded pool lines are read on.
pub struct RecognitionCascade {
    tiers: Vec<Box<dyn TextRecognizer>>,
    pool: rayon::ThreadPool,
    policy: ParallelPolicy,
}

impl std::fmt::Debug for RecognitionCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionCascade")
            .field(
                "tiers",
                &self
                    .tiers
                    .iter()
                    .map(|t| (t.name().to_string(), t.capacity()))
                    .collect::<Vec<_>>(),
            )
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl RecognitionCascade {
    /// Creates a cascade. Tiers must be non-empty and strictly increasing in capacity.
    pub fn new(
        tiers: Vec<Box<dyn TextRecognizer>>,
        policy: &ParallelPolicy,
    ) -> Result<Self, OCRError> {
        if tiers.is_empty() {
            return Err(OCRError::config_error_detailed(
                "recognition cascade",
                "at least one recognizer is required",
            ));
        }
        if tiers.windows(2).any(|w| w[0].capacity() >= w[1].capacity()) {
            return Err(OCRError::config_error_detailed(
                "recognition cascade",
                "recognizer tiers must be ordered by strictly increasing capacity",
            ));
        }
        Ok(Self {
            tiers,
            pool: policy.build_recognition_pool()?,
            policy: policy.clone(),
        })
    }

    /// Number of tiers.
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    /// Capacities of the tiers, smallest first.
    pub fn capacities(&self) -> Vec<usize> {
        self.tiers.iter().map(|t| t.capacity()).collect()
    }

    /// Recognizes every line, returning outcomes in input order.
    ///
    /// Fails as a whole if any recognizer call fails.
    pub fn recognize(
        &self,
        lines: &[CascadeLine],
        config: &CascadeConfig,
    ) -> Result<Vec<CascadeOutcome>, OCRError> {
        let last = self.tiers.len() - 1;
        let mut current: Vec<usize> = lines
            .iter()
            .map(|l| {
                if config.use_length_hints {
                    l.start_tier.min(last)
                } else {
                    0
                }
            })
            .collect();
        let mut outcomes: Vec<Option<CascadeOutcome>> = vec![None; lines.len()];

        for (tier, recognizer) in self.tiers.iter().enumerate() {
            let batch: Vec<usize> = (0..lines.len())
                .filter(|&i| outcomes[i].is_none() && current[i] == tier)
                .collect();
            if batch.is_empty() {
                continue;
            }

            let results = self.run_batch(recognizer.as_ref(), lines, &batch)?;

            let threshold = config.escalation_thresholds.get(tier).copied();
            let mut escalated = 0usize;
            for (i, recognition) in batch.into_iter().zip(results) {
                let escalate = tier < last
                    && threshold.is_some_and(|limit| recognition.char_count() >= limit);
                if escalate {
                    current[i] = tier + 1;
                    escalated += 1;
                } else {
                    outcomes[i] = Some(CascadeOutcome { recognition, tier });
                }
            }
            debug!(
                tier,
                recognizer = recognizer.name(),
                escalated,
                "cascade tier finished"
            );
        }

        outcomes
            .into_iter()
            .enumerate()
            .map(|(i, outcome)| {
                outcome.ok_or_else(|| {
                    OCRError::image_processing_error(format!("line {i} left the cascade unread"))
                })
            })
            .collect()
    }

    fn run_batch(
        &self,
        recognizer: &dyn TextRecognizer,
        lines: &[CascadeLine],
        batch: &[usize],
    ) -> Result<Vec<Recognition>, OCRError> {
        let read = |&i: &usize| {
            recognizer.recognize(&lines[i].image).map_err(|e| {
                OCRError::processing(
                    ProcessingStage::TextRecognition,
                    format!("recognizer '{}' on line {}", recognizer.name(), i),
                    e,
                )
            })
        };

        if self.policy.should_parallelize(batch.len()) {
            self.pool
                .install(|| batch.par_iter().map(read).collect::<Result<Vec<_>, _>>())
        } else {
            batch.iter().map(read).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::SimpleError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reads a line as `len` copies of `fill`, where `len` is the image width,
    /// truncated to the capacity.
    struct WidthReader {
        capacity: usize,
        fill: char,
        calls: Arc<AtomicUsize>,
    }

    impl TextRecognizer for WidthReader {
        fn name(&self) -> &str {
            "width-reader"
        }

        fn capacity(&self) -> usize {
            self.capacity
        }

        fn recognize(&self, line: &RgbImage) -> Result<Recognition, OCRError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let len = (line.width() as usize).min(self.capacity);
            Ok(Recognition {
                text: std::iter::repeat_n(self.fill, len).collect(),
                confidence: Some(0.9),
            })
        }
    }

    struct Failing;

    impl TextRecognizer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn capacity(&self) -> usize {
            200
        }

        fn recognize(&self, _line: &RgbImage) -> Result<Recognition, OCRError> {
            Err(OCRError::processing(
                ProcessingStage::TextRecognition,
                "boom",
                SimpleError::new("model crashed"),
            ))
        }
    }

    fn tiers() -> (Vec<Box<dyn TextRecognizer>>, Vec<Arc<AtomicUsize>>) {
        let calls: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let tiers: Vec<Box<dyn TextRecognizer>> = vec![
            Box::new(WidthReader {
                capacity: 30,
                fill: 'a',
                calls: calls[0].clone(),
            }),
            Box::new(WidthReader {
                capacity: 50,
                fill: 'b',
                calls: calls[1].clone(),
            }),
            Box::new(WidthReader {
                capacity: 100,
                fill: 'c',
                calls: calls[2].clone(),
            }),
        ];
        (tiers, calls)
    }

    fn line(width: u32) -> CascadeLine {
        CascadeLine {
            image: RgbImage::new(width, 4),
            start_tier: 0,
        }
    }

    #[test]
    fn test_escalation_boundaries() {
        let (tiers, calls) = tiers();
        let cascade = RecognitionCascade::new(tiers, &ParallelPolicy::default()).expect("cascade");
        let lines = vec![line(10), line(24), line(25), line(44), line(45), line(80)];

        let outcomes = cascade
            .recognize(&lines, &CascadeConfig::default())
            .expect("recognize");

        let tiers: Vec<usize> = outcomes.iter().map(|o| o.tier).collect();
        assert_eq!(tiers, vec![0, 0, 1, 1, 2, 2]);
        assert_eq!(outcomes[0].recognition.text, "a".repeat(10));
        assert_eq!(outcomes[3].recognition.text, "b".repeat(44));
        assert_eq!(outcomes[5].recognition.text, "c".repeat(80));
        assert_eq!(calls[0].load(Ordering::SeqCst), 6);
        assert_eq!(calls[1].load(Ordering::SeqCst), 4);
        assert_eq!(calls[2].load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_length_hints_start_higher() {
        let (tiers, calls) = tiers();
        let cascade = RecognitionCascade::new(tiers, &ParallelPolicy::default()).expect("cascade");
        let lines = vec![CascadeLine {
            image: RgbImage::new(10, 4),
            start_tier: 2,
        }];

        let ignored = cascade
            .recognize(&lines, &CascadeConfig::default())
            .expect("recognize");
        assert_eq!(ignored[0].tier, 0);

        let config = CascadeConfig {
            use_length_hints: true,
            ..CascadeConfig::default()
        };
        let hinted = cascade.recognize(&lines, &config).expect("recognize");
        assert_eq!(hinted[0].tier, 2);
        assert_eq!(calls[2].load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_batches_keep_input_order() {
        let (tiers, _) = tiers();
        let policy = ParallelPolicy::new()
            .with_max_threads(Some(3))
            .with_recognition_threshold(0);
        let cascade = RecognitionCascade::new(tiers, &policy).expect("cascade");
        let widths: Vec<u32> = (1..=20).collect();
        let lines: Vec<CascadeLine> = widths.iter().map(|&w| line(w)).collect();

        let outcomes = cascade
            .recognize(&lines, &CascadeConfig::default())
            .expect("recognize");
        for (outcome, width) in outcomes.iter().zip(widths) {
            assert_eq!(outcome.recognition.char_count(), width as usize);
        }
    }

    #[test]
    fn test_failure_fails_the_batch() {
        let tiers: Vec<Box<dyn TextRecognizer>> = vec![Box::new(Failing)];
        let cascade = RecognitionCascade::new(tiers, &ParallelPolicy::default()).expect("cascade");
        let err = cascade
            .recognize(&[line(5), line(6)], &CascadeConfig::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("text recognition"));
    }

    #[test]
    fn test_rejects_unordered_tiers() {
        let (mut tiers, _) = tiers();
        tiers.swap(0, 2);
        assert!(RecognitionCascade::new(tiers, &ParallelPolicy::default()).is_err());
        assert!(RecognitionCascade::new(Vec::new(), &ParallelPolicy::default()).is_err());
    }

    #[test]
    fn test_empty_input() {
        let (tiers, _) = tiers();
        let cascade = RecognitionCascade::new(tiers, &ParallelPolicy::default()).expect("cascade");
        assert!(cascade
            .recognize(&[], &CascadeConfig::default())
            .expect("recognize")
            .is_empty());
    }
}
