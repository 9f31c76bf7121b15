//! Protocol definition for the status endpoint.
//!
use serde::{Deserialize, Serialize};

/// Top-ranked class of a single classification.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Percentage in `[0, 100]`.
    pub confidence: f32,
}

impl Prediction {
    /// Create a prediction from a raw probability in `[0, 1]`.
    pub fn from_probability(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            confidence: (probability * 100.0).clamp(0.0, 100.0),
        }
    }

    /// Confidence formatted with two decimals, e.g. `70.00%`.
    pub fn confidence_text(&self) -> String {
        format!("{:.2}%", self.confidence)
    }
}

/// Lifecycle of the classification model.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed(String),
}

/// Snapshot of everything the page renders.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct StatusMsg {
    pub model: ModelStatus,
    pub webcam_active: bool,
    pub prediction: Option<Prediction>,
    pub notice: Option<String>,
    pub upload_preview: bool,
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_confidence_as_percentage() {
        let prediction = Prediction::from_probability("B", 0.7);
        assert_eq!(prediction.label, "B");
        assert_eq!(prediction.confidence_text(), "70.00%");

        assert_eq!(Prediction::from_probability("A", 1.3).confidence, 100.0);
        assert_eq!(Prediction::from_probability("A", -0.1).confidence, 0.0);
    }

    #[test]
    fn test_model_status_json_shape() -> Result<(), serde_json::Error> {
        let failed = serde_json::to_value(ModelStatus::Failed("missing".into()))?;
        assert_eq!(failed["state"], "failed");
        assert_eq!(failed["reason"], "missing");

        let ready = serde_json::to_value(ModelStatus::Ready)?;
        assert_eq!(ready["state"], "ready");

        Ok(())
    }
}
