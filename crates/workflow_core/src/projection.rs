//! Pure mapping from an analysis outcome to presentation data.

use shared::domain::{ImageRef, Prediction};

use crate::AnalysisOutcome;

/// Banner and artifact data for the presentation layer. The rounded
/// percentage is cosmetic only and never feeds back into stored state.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    pub label: Prediction,
    /// Confidence scaled to [0, 100] and rounded to one decimal place.
    pub confidence_percent: f64,
    pub roi: ImageRef,
    pub heatmap: ImageRef,
}

impl ResultView {
    pub fn from_outcome(outcome: &AnalysisOutcome) -> Self {
        Self {
            label: outcome.prediction,
            confidence_percent: (outcome.confidence * 1000.0).round() / 10.0,
            roi: outcome.roi.clone(),
            heatmap: outcome.heatmap.clone(),
        }
    }

    pub fn confidence_display(&self) -> String {
        format!("{:.1}%", self.confidence_percent)
    }
}
