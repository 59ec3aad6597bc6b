//! pmrotate alert channel
//!
//! Rotation-breaking failures are always logged; when a channel is
//! configured they are also pushed to it:
//! - Telegram

mod error;
mod event;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod telegram;

pub use error::{NotifyError, Result};
pub use event::RotationEvent;
pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use pmrotate_core::NotifyConfig;
use std::sync::Arc;
use tracing::{error, warn};

/// Trait for alert backends
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, event: &RotationEvent) -> Result<()>;

    fn is_configured(&self) -> bool;
}

/// Fans alerts out to every configured channel
#[derive(Default)]
pub struct NotificationManager {
    channels: Vec<Arc<dyn Notifier>>,
    events: Vec<String>,
}

impl NotificationManager {
    pub fn new(config: &NotifyConfig) -> Self {
        let mut manager = Self {
            channels: Vec::new(),
            events: config.events.clone(),
        };

        if let Some(tc) = &config.telegram {
            manager = manager.with_channel(Arc::new(TelegramNotifier::new(
                tc.bot_token.clone(),
                tc.chat_id.clone(),
            )));
        }

        manager
    }

    pub fn with_channel(mut self, channel: Arc<dyn Notifier>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.channels.iter().any(|c| c.is_configured())
    }

    fn should_notify(&self, event: &RotationEvent) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event.event_type())
    }

    /// Deliver an event to every channel, waiting for each
    pub async fn notify(&self, event: &RotationEvent) {
        if !self.should_notify(event) {
            return;
        }

        for channel in &self.channels {
            if let Err(e) = channel.send(event).await {
                warn!("Failed to send {} alert: {}", channel.name(), e);
            }
        }
    }

    /// Log an event and deliver it in the background
    pub fn alert(self: &Arc<Self>, event: RotationEvent) {
        error!("{}", event.format_message());

        if self.channels.is_empty() || !self.should_notify(&event) {
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.notify(&event).await;
        });
    }
}
