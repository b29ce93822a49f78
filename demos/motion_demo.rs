use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use vigil::{DetectorEngine, SyntheticScene, SyntheticSource, VigilConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting motion demo");

    // Keep the demo self-contained under the system temp directory
    let capture_dir = std::env::temp_dir().join("vigil_motion_demo");
    let mut config = VigilConfig::default();
    config.storage.capture_dir = capture_dir.to_string_lossy().to_string();
    config.source.resolution = (320, 240);
    config.detector.motion_threshold = 2000;
    config.detector.debounce_frame_count = 3;
    config.detector.cooldown_seconds = 2;

    // A quiet stretch, then a bright square hopping between two spots
    let (width, height) = config.source.resolution;
    let mut script = vec![SyntheticScene::flat(); 5];
    for hop in 0..6 {
        let x = if hop % 2 == 0 { width / 8 } else { width / 2 };
        script.push(SyntheticScene::blob_at(x, height / 4, 60));
    }

    let source = Arc::new(SyntheticSource::cycling(width, height, script));
    let engine = DetectorEngine::new(config, source).await?;

    engine.start().await?;
    info!("Engine running for five seconds");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if let Some(event) = engine.poll_event(Some(Duration::from_millis(250))).await {
            info!("[{}] {}", event.event_type(), event.description());
        }
    }

    engine.stop().await;

    let stats = engine.statistics();
    info!(
        "Demo finished: {} frames read, {} motion events, {} captures saved",
        stats.frames_read, stats.motions_detected, stats.captures_saved
    );
    for line in engine.recent_history(5).await? {
        info!("history: {}", line);
    }

    Ok(())
}
