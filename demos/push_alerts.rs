use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};
use zetimers::{
    ActivitySample, Alarm, CalendarEvent, CalendarOperation, DeviceEvent, EventSink, ForecastDay,
    NotificationKind, NotificationPush, Result, SampleStore, WeatherSnapshot, ZeTimeDevice,
};

/// Prints watch events; music and call controls come back on the
/// notification channel while the demo runs.
struct AlertSink;

impl EventSink for AlertSink {
    fn on_event(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Music(control) => info!("🎵 Music control from watch: {control:?}"),
            DeviceEvent::Call(control) => info!("📞 Call control from watch: {control:?}"),
            DeviceEvent::SettingsConfirmed(kind) => info!("✅ Watch confirmed {kind:?}"),
            other => info!("📨 {other:?}"),
        }
    }

    fn on_warning(&self, message: &str) {
        warn!("⚠️ {message}");
    }
}

impl SampleStore for AlertSink {
    fn add_sample(&self, _sample: &ActivitySample) -> Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("⌚ ZeTimers Alert Push Example");
    info!("Searching for ZeTime watches...");

    let sink = Arc::new(AlertSink);
    let watch = match ZeTimeDevice::connect_first(sink.clone(), sink).await {
        Ok(device) => {
            info!("✅ Connected to: {}", device.device_info().name);
            device
        }
        Err(e) => {
            error!("❌ Failed to connect to watch: {}", e);
            return Err(e);
        }
    };

    // Push a text notification
    info!("💬 Sending a notification...");
    watch
        .send_notification(&NotificationPush {
            kind: NotificationKind::Sms,
            title: "Alice".to_string(),
            body: "running late, see you at 7".to_string(),
        })
        .await?;
    info!("✅ Notification sent");

    sleep(Duration::from_secs(2)).await;

    // Push today's weather with a three-day forecast
    info!("🌤️ Sending weather...");
    watch
        .send_weather(&WeatherSnapshot {
            condition: 1,
            temperature: 21,
            forecast: [
                ForecastDay {
                    condition: 1,
                    low: 14,
                    high: 23,
                },
                ForecastDay {
                    condition: 3,
                    low: 12,
                    high: 19,
                },
                ForecastDay {
                    condition: 2,
                    low: 13,
                    high: 20,
                },
            ],
        })
        .await?;
    info!("✅ Weather sent");

    // Push a calendar event for tomorrow morning
    info!("📅 Sending a calendar event...");
    watch
        .send_calendar_event(&CalendarEvent {
            operation: CalendarOperation::Set,
            year: 2026,
            month: 8,
            day: 25,
            hour: 9,
            minute: 30,
            title: "Team standup".to_string(),
        })
        .await?;
    info!("✅ Calendar event sent");

    // Set a wake-up alarm in slot 0
    info!("⏰ Setting an alarm...");
    watch
        .set_alarm(&Alarm {
            slot: 0,
            year: 2026,
            month: 8,
            day: 25,
            hour: 7,
            minute: 0,
            repeat: 0b0011111, // weekdays
            enabled: true,
        })
        .await?;
    info!("✅ Alarm set");

    // Leave the connection up briefly so music/call controls pressed on
    // the watch show up in the log
    info!("👂 Listening for watch controls for 15 seconds...");
    sleep(Duration::from_secs(15)).await;

    info!("🔌 Disconnecting...");
    watch.disconnect().await?;
    info!("✅ Disconnected successfully");

    Ok(())
}
