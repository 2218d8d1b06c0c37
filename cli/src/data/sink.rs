//! Alert delivery, decoupled from the engine.
//!
//! The engine pushes [`AlertEvent`]s into an unbounded channel and moves on;
//! the delivery task drains the channel into the notification sink. A
//! delivery fault is logged and never reaches the engine, so timing state
//! stays consistent even when the user never sees the alert.

use color_eyre::eyre::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::data::notify::AlertEvent;

pub trait NotificationSink: Send + 'static {
    fn deliver(&self, title: &str, body: &str) -> Result<()>;
}

/// Sink backed by the desktop notification service.
pub struct DesktopSink;

impl NotificationSink for DesktopSink {
    fn deliver(&self, title: &str, body: &str) -> Result<()> {
        notify_rust::Notification::new()
            .summary(title)
            .body(body)
            .icon("battery-caution")
            .show()?;
        Ok(())
    }
}

pub fn render_title(event: &AlertEvent) -> String {
    format!("{} Low Battery: {}", event.kind.emoji(), event.display_name)
}

pub fn render_body(event: &AlertEvent) -> String {
    format!(
        "Battery level is at {}%\nPlease charge your device soon.",
        event.level
    )
}

pub fn spawn_delivery_task(
    mut events: mpsc::UnboundedReceiver<AlertEvent>,
    sink: Box<dyn NotificationSink>,
) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = sink.deliver(&render_title(&event), &render_body(&event)) {
                warn!(device = %event.device_id, error = %e, "notification delivery failed");
            }
        }
        debug!("alert channel closed, delivery task exiting");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use btbat_protocol::DeviceKind;
    use color_eyre::eyre::eyre;

    use super::*;

    fn event() -> AlertEvent {
        AlertEvent {
            device_id: "dev".to_string(),
            display_name: "Office Headset".to_string(),
            kind: DeviceKind::AudioVideo,
            level: 12,
        }
    }

    #[test]
    fn test_rendered_text() {
        let event = event();
        assert_eq!(render_title(&event), "\u{1f3a7} Low Battery: Office Headset");
        assert_eq!(
            render_body(&event),
            "Battery level is at 12%\nPlease charge your device soon."
        );
    }

    struct CountingSink {
        delivered: Arc<AtomicUsize>,
        fail: bool,
    }

    impl NotificationSink for CountingSink {
        fn deliver(&self, _title: &str, _body: &str) -> Result<()> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(eyre!("notification service unavailable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_delivery_task_drains_channel() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_delivery_task(
            rx,
            Box::new(CountingSink {
                delivered: delivered.clone(),
                fail: false,
            }),
        );

        tx.send(event()).unwrap();
        tx.send(event()).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_stop_the_task() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_delivery_task(
            rx,
            Box::new(CountingSink {
                delivered: delivered.clone(),
                fail: true,
            }),
        );

        tx.send(event()).unwrap();
        tx.send(event()).unwrap();
        drop(tx);
        handle.await.unwrap();

        // Both events were attempted despite the first failing.
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }
}
