use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use zetimers::{ActivitySample, DeviceEvent, EventSink, Result, SampleStore, ZeTimeDevice};

/// Collects samples in memory and prints sync progress as it happens.
struct SyncObserver {
    samples: Mutex<Vec<ActivitySample>>,
}

impl EventSink for SyncObserver {
    fn on_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Battery(report) => {
                info!("🔋 Battery: {}% ({:?})", report.level, report.state);
            }
            DeviceEvent::BacklogCounts {
                steps,
                sleep,
                heart_rate,
            } => {
                info!(
                    "📦 Watch has {steps} step, {sleep} sleep, {heart_rate} heart-rate records buffered"
                );
            }
            DeviceEvent::FetchProgress(progress) => {
                info!(
                    "⏳ {}: {}/{} ({}%)",
                    progress.kind,
                    progress.received,
                    progress.total,
                    progress.percent()
                );
            }
            DeviceEvent::FetchFinished => {
                info!("✅ Activity sync finished");
            }
            other => {
                info!("📨 {other:?}");
            }
        }
    }

    fn on_warning(&self, message: &str) {
        warn!("⚠️ {message}");
    }
}

impl SampleStore for SyncObserver {
    fn add_sample(&self, sample: &ActivitySample) -> Result<()> {
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("⌚ ZeTimers Activity Sync Example");
    info!("Searching for ZeTime watches...");

    let observer = Arc::new(SyncObserver {
        samples: Mutex::new(Vec::new()),
    });

    let watch = match ZeTimeDevice::connect_first(observer.clone(), observer.clone()).await {
        Ok(device) => {
            info!("✅ Connected to: {}", device.device_info().name);
            device
        }
        Err(e) => {
            error!("❌ Failed to connect to watch: {}", e);
            return Err(e);
        }
    };

    let version = watch.version();
    info!(
        "📟 Firmware: {}, hardware: {}",
        version.firmware.as_deref().unwrap_or("unknown"),
        version.hardware.as_deref().unwrap_or("unknown"),
    );

    // Pull everything the watch recorded while offline
    info!("📥 Starting activity sync...");
    watch.fetch_recorded_data().await?;

    // Give the transfer time to run; progress arrives on the sink
    for _ in 0..60 {
        sleep(Duration::from_secs(1)).await;
        if !observer.samples.lock().unwrap().is_empty()
            && watch.state().await == zetimers::ConnectionState::Initialized
        {
            break;
        }
    }

    let samples = observer.samples.lock().unwrap();
    info!("📊 Synced {} samples:", samples.len());
    for sample in samples.iter().take(10) {
        info!("  {sample:?}");
    }
    if samples.len() > 10 {
        info!("  ... and {} more", samples.len() - 10);
    }
    drop(samples);

    info!("🔌 Disconnecting...");
    watch.disconnect().await?;
    info!("✅ Disconnected successfully");

    Ok(())
}
