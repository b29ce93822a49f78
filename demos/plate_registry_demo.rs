use std::sync::Arc;
use tracing::{info, Level};
use vigil::{
    EventChannel, FrameSource, PlateRegistry, PlateWatcher, StaticRecognizer, SyntheticSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting plate registry demo");

    let dir = std::env::temp_dir().join("vigil_plate_demo");
    tokio::fs::create_dir_all(&dir).await?;

    // Authorize two plates; input is normalized to six digits
    let mut registry = PlateRegistry::load(dir.join("authorized_plates.json")).await?;
    registry.add("123456").await?;
    registry.add("CR 78-90-12").await?;
    info!(
        "Registry holds {} plates: {:?}",
        registry.len(),
        registry.plates()
    );

    // A canned recognizer stands in for the OCR backend
    let events = EventChannel::new();
    let watcher = PlateWatcher::new(
        registry,
        Arc::new(StaticRecognizer::plate("BCR 789012")),
        events.sender(),
    );

    // Grab one frame from a synthetic source and review it
    let source = SyntheticSource::flat(64, 48);
    let mut handle = source.open(0).await?;
    let frame = handle.read().await?;

    let review = watcher.review(&frame).await;
    info!("Review verdict: {:?}", review);

    while let Some(event) = events.poll(None).await {
        info!("[{}] {}", event.event_type(), event.description());
    }

    handle.release();
    Ok(())
}
