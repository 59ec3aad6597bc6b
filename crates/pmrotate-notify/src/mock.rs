//! Recording notifier for tests

use crate::error::{NotifyError, Result};
use crate::event::RotationEvent;
use crate::Notifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Records every event it is asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<RotationEvent>>,
    call_count: AtomicUsize,
    should_fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose sends always fail
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<RotationEvent> {
        self.events.lock().clone()
    }

    pub fn was_event_type_sent(&self, event_type: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|e| e.event_type() == event_type)
    }

    /// Wait until at least `count` events arrived (gives up after a second)
    pub async fn wait_for(&self, count: usize) -> bool {
        for _ in 0..100 {
            if self.events.lock().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, event: &RotationEvent) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if self.should_fail {
            return Err(NotifyError::telegram("Mock failure"));
        }

        self.events.lock().push(event.clone());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        true
    }
}
