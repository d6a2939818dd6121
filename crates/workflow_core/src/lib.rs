use std::sync::Arc;

use shared::domain::{AnalysisId, ImageRef, Prediction};
use thiserror::Error;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod intake;
pub mod projection;
pub mod service;

pub use intake::{validate, StagedImage, UploadCandidate, ValidationError, MAX_UPLOAD_BYTES};
pub use projection::ResultView;
pub use service::{AnalysisError, AnalysisService, HttpAnalysisService, MissingAnalysisService};

/// Terminal success value of one analysis invocation. Replaced wholesale by
/// the next invocation or cleared by reset; never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub prediction: Prediction,
    /// Always within [0, 1]; enforced at the service boundary.
    pub confidence: f64,
    pub roi: ImageRef,
    pub heatmap: ImageRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    Idle,
    Staged(StagedImage),
    Analyzing(StagedImage),
    Succeeded(StagedImage, AnalysisOutcome),
    Failed {
        image: Option<StagedImage>,
        reason: String,
    },
}

impl WorkflowState {
    /// The image the workflow currently retains, if any. `Failed` keeps the
    /// prior image so the user can retry without re-uploading.
    pub fn staged_image(&self) -> Option<&StagedImage> {
        match self {
            Self::Idle => None,
            Self::Staged(image) | Self::Analyzing(image) | Self::Succeeded(image, _) => {
                Some(image)
            }
            Self::Failed { image, .. } => image.as_ref(),
        }
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self, Self::Analyzing(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Staged(_) => "staged",
            Self::Analyzing(_) => "analyzing",
            Self::Succeeded(..) => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    StateChanged(WorkflowState),
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error("analysis in progress; reset the workflow before staging a new image")]
    AnalysisInProgress,
    #[error(transparent)]
    Rejected(#[from] ValidationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalyzeError {
    #[error("no image is staged for analysis")]
    NothingStaged,
    #[error("an analysis is already in progress")]
    AlreadyAnalyzing,
}

struct InFlightAnalysis {
    id: AnalysisId,
    task: JoinHandle<()>,
}

struct ControllerInner {
    state: WorkflowState,
    next_analysis_id: u64,
    in_flight: Option<InFlightAnalysis>,
}

/// Owns the workflow state and the single in-flight analysis. All mutation
/// goes through [`stage`](Self::stage), [`analyze`](Self::analyze),
/// [`reset`](Self::reset), and the internal completion path; the
/// presentation layer reads snapshots and subscribes to events.
pub struct WorkflowController {
    service: Arc<dyn AnalysisService>,
    inner: Mutex<ControllerInner>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowController {
    pub fn new() -> Arc<Self> {
        Self::new_with_service(Arc::new(MissingAnalysisService))
    }

    pub fn new_with_service(service: Arc<dyn AnalysisService>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            service,
            inner: Mutex::new(ControllerInner {
                state: WorkflowState::Idle,
                next_analysis_id: 0,
                in_flight: None,
            }),
            events,
        })
    }

    pub async fn snapshot(&self) -> WorkflowState {
        self.inner.lock().await.state.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Validates a candidate and stages it, replacing any prior staged
    /// image. Rejected while an analysis is in flight: the caller must
    /// reset first. A validation failure moves the workflow to `Failed`
    /// carrying the prior image (if one was retained) and the reason.
    pub async fn stage(&self, candidate: UploadCandidate) -> Result<StagedImage, StageError> {
        let mut guard = self.inner.lock().await;
        if guard.state.is_analyzing() {
            warn!(
                declared = candidate.declared_media_type(),
                "workflow: stage rejected while analysis is in flight"
            );
            return Err(StageError::AnalysisInProgress);
        }

        match intake::validate(candidate) {
            Ok(image) => {
                info!(
                    media_type = image.media_type().as_mime(),
                    size_bytes = image.size_bytes(),
                    "workflow: image staged"
                );
                self.apply(&mut guard, WorkflowState::Staged(image.clone()));
                Ok(image)
            }
            Err(err) => {
                warn!("workflow: intake rejected candidate: {err}");
                let prior = guard.state.staged_image().cloned();
                self.apply(
                    &mut guard,
                    WorkflowState::Failed {
                        image: prior,
                        reason: err.to_string(),
                    },
                );
                Err(StageError::Rejected(err))
            }
        }
    }

    /// Starts one analysis for the retained image. Legal from `Staged`,
    /// from `Failed` that kept its image (retry without re-upload), and
    /// from `Succeeded` (re-analysis). Never from `Analyzing`: one
    /// invocation per staged image at a time, by construction.
    pub async fn analyze(self: &Arc<Self>) -> Result<AnalysisId, AnalyzeError> {
        let mut guard = self.inner.lock().await;
        if guard.state.is_analyzing() {
            return Err(AnalyzeError::AlreadyAnalyzing);
        }
        let Some(image) = guard.state.staged_image().cloned() else {
            return Err(AnalyzeError::NothingStaged);
        };

        let id = AnalysisId(guard.next_analysis_id);
        guard.next_analysis_id += 1;
        self.apply(&mut guard, WorkflowState::Analyzing(image.clone()));

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = controller.service.analyze(&image).await;
            controller.finish_analysis(id, result).await;
        });
        guard.in_flight = Some(InFlightAnalysis { id, task });
        info!(analysis_id = id.0, "workflow: analysis started");
        Ok(id)
    }

    /// Returns the workflow to `Idle` from any state. Cancels the in-flight
    /// analysis (its eventual outcome is discarded) and releases the staged
    /// image. Idempotent: a second reset is a no-op and emits nothing.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(in_flight) = guard.in_flight.take() {
            in_flight.task.abort();
            debug!(
                analysis_id = in_flight.id.0,
                "workflow: in-flight analysis cancelled by reset"
            );
        }
        if !matches!(guard.state, WorkflowState::Idle) {
            info!(from = guard.state.name(), "workflow: reset to idle");
            self.apply(&mut guard, WorkflowState::Idle);
        }
    }

    /// Completion path for one analysis invocation. An outcome whose id no
    /// longer matches the in-flight record arrived after a reset and is
    /// dropped without touching the state.
    async fn finish_analysis(&self, id: AnalysisId, result: Result<AnalysisOutcome, AnalysisError>) {
        let mut guard = self.inner.lock().await;
        if guard.in_flight.as_ref().map(|in_flight| in_flight.id) != Some(id) {
            debug!(analysis_id = id.0, "workflow: discarding stale analysis outcome");
            return;
        }
        guard.in_flight = None;

        let WorkflowState::Analyzing(image) = guard.state.clone() else {
            // in_flight is only populated while Analyzing; if this fires the
            // bookkeeping above has a hole.
            warn!(
                analysis_id = id.0,
                state = guard.state.name(),
                "workflow: analysis completed outside analyzing state"
            );
            return;
        };

        match result {
            Ok(outcome) => {
                info!(
                    analysis_id = id.0,
                    prediction = outcome.prediction.as_str(),
                    confidence = outcome.confidence,
                    "workflow: analysis succeeded"
                );
                self.apply(&mut guard, WorkflowState::Succeeded(image, outcome));
            }
            Err(err) => {
                warn!(analysis_id = id.0, "workflow: analysis failed: {err}");
                self.apply(
                    &mut guard,
                    WorkflowState::Failed {
                        image: Some(image),
                        reason: err.to_string(),
                    },
                );
            }
        }
    }

    fn apply(&self, guard: &mut ControllerInner, next: WorkflowState) {
        guard.state = next.clone();
        let _ = self.events.send(WorkflowEvent::StateChanged(next));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
