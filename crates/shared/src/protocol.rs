use serde::{Deserialize, Serialize};

use crate::domain::{ImageRef, MediaType, Prediction};

/// Request body for `POST /analyze` on the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub media_type: MediaType,
    pub image_b64: String,
}

/// Success body from the analysis service.
///
/// All fields are required: an outcome with only one of the two visual
/// artifacts is invalid, so the pairing is structural here rather than
/// checked after decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub prediction: Prediction,
    pub confidence: f64,
    pub roi_image: ImageRef,
    pub heatmap_image: ImageRef,
}
