//! Inference engine: frame in, top-ranked class out.
//!
use std::sync::Arc;

use common::protocol::Prediction;
use image::RgbImage;

use crate::{error::InferenceError, loader::ModelHandle, meter::Meter, preproc::preprocess};

pub struct InferenceEngine {
    meter: Arc<Meter>,
}

impl InferenceEngine {
    pub fn new(meter: Arc<Meter>) -> Self {
        Self { meter }
    }

    /// Classify a frame with the given model.
    ///
    /// Without a model this is a no-op returning `Ok(None)`. Input and output tensors are
    /// held in meter leases, so any tensor outliving the call shows in the live gauge.
    pub fn predict(
        &self,
        model: Option<&ModelHandle>,
        frame: &RgbImage,
    ) -> Result<Option<Prediction>, InferenceError> {
        let model = match model {
            Some(model) => model,
            None => return Ok(None),
        };

        let scores = {
            let input = self.meter.lease_tensor(preprocess(frame, model.input_shape()));

            self.meter.tick_forward();
            // The runtime consumes its input
            let output = self.meter.lease_tensor(model.forward(input.into_inner())?);

            let scores: Vec<f32> = output.to_array_view::<f32>()?.iter().copied().collect();
            scores
        };

        let (index, probability) = top_class(&scores).ok_or(InferenceError::EmptyOutput)?;
        let labels = model.labels();
        if labels.len() != scores.len() {
            return Err(InferenceError::LabelMismatch {
                labels: labels.len(),
                outputs: scores.len(),
            });
        }

        let prediction = Prediction::from_probability(labels[index].as_str(), probability);
        log::debug!(
            "Predicted {} with {}",
            &prediction.label,
            prediction.confidence_text()
        );
        self.meter.tick_prediction();

        Ok(Some(prediction))
    }
}

/// Index and score of the highest score. Ties resolve to the first maximum, NaN never wins.
fn top_class(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .fold(None, |best, (index, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((index, score)),
        })
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_top_class_picks_maximum() {
        assert_eq!(top_class(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
    }

    #[test]
    fn test_top_class_ties_resolve_to_first() {
        assert_eq!(top_class(&[0.4, 0.1, 0.4]), Some((0, 0.4)));
    }

    #[test]
    fn test_top_class_skips_nan() {
        assert_eq!(top_class(&[f32::NAN, 0.3, 0.2]), Some((1, 0.3)));
        assert_eq!(top_class(&[f32::NAN]), None);
        assert_eq!(top_class(&[]), None);
    }
}
