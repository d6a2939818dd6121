use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;
use workflow_core::{
    HttpAnalysisService, ResultView, UploadCandidate, WorkflowController, WorkflowEvent,
    WorkflowState,
};

mod config;

/// Sends one histopathology image through the analysis workflow and prints
/// the projected result.
#[derive(Parser, Debug)]
struct Args {
    /// Image file to analyze (JPEG, PNG, or TIFF).
    #[arg(long)]
    image: std::path::PathBuf,
    /// Analysis service base URL; falls back to demo.toml or
    /// ANALYSIS_SERVICE_URL.
    #[arg(long)]
    service_url: Option<String>,
    /// Declared media type; inferred from the file extension when omitted.
    #[arg(long)]
    media_type: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn declared_media_type(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg".into(),
        Some("png") => "image/png".into(),
        Some("tif") | Some("tiff") => "image/tiff".into(),
        // Pass the raw extension through so intake reports it by name.
        Some(other) => format!("image/{other}"),
        None => "application/octet-stream".into(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();
    let settings = config::load_settings();

    let service_url = args
        .service_url
        .or(settings.service_url)
        .context("no analysis service URL; pass --service-url or set ANALYSIS_SERVICE_URL")?;
    let service_url = Url::parse(&service_url)
        .with_context(|| format!("invalid analysis service URL: {service_url}"))?;

    let mut service =
        HttpAnalysisService::new(service_url.as_str().trim_end_matches('/').to_string());
    if let Some(secs) = args.timeout_secs.or(settings.request_timeout_secs) {
        service = service.with_timeout(Duration::from_secs(secs));
    }

    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let declared = args
        .media_type
        .unwrap_or_else(|| declared_media_type(&args.image));

    info!(service_url = %service_url, "analysis service selected");

    let controller = WorkflowController::new_with_service(Arc::new(service));
    let mut events = controller.subscribe_events();

    let staged = controller
        .stage(UploadCandidate::new(declared, bytes))
        .await?;
    println!(
        "Staged {} ({} bytes, {})",
        args.image.display(),
        staged.size_bytes(),
        staged.media_type().as_mime()
    );

    let analysis_id = controller.analyze().await?;
    info!(analysis_id = analysis_id.0, "analysis dispatched");
    println!("Analyzing...");

    loop {
        let WorkflowEvent::StateChanged(state) = events
            .recv()
            .await
            .context("workflow event stream closed")?;
        match state {
            WorkflowState::Succeeded(_, outcome) => {
                let view = ResultView::from_outcome(&outcome);
                println!("Prediction: {}", view.label.as_str());
                println!("Confidence: {}", view.confidence_display());
                println!("ROI artifact: {}", view.roi.as_str());
                println!("Heatmap artifact: {}", view.heatmap.as_str());
                return Ok(());
            }
            WorkflowState::Failed { reason, .. } => bail!("analysis failed: {reason}"),
            _ => {}
        }
    }
}
