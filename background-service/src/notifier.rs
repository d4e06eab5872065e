//! Alert transports for matched items.

use async_trait::async_trait;
use listener_core::{
    ConfigError, CoreError, MatchEvent, Notifier, NotifierConfig, NotifierError, NotifierKind,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Desktop notification through the platform notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn send(&self, event: &MatchEvent) -> Result<(), CoreError> {
        let app_name = self.app_name.clone();
        let summary = event.headline();
        let body = event.body();

        // The D-Bus call blocks, keep it off the runtime threads.
        let shown = tokio::task::spawn_blocking(move || {
            notify_rust::Notification::new()
                .appname(&app_name)
                .summary(&summary)
                .body(&body)
                .show()
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| NotifierError::Unavailable {
            notifier: "desktop".to_string(),
            reason: e.to_string(),
        })?;

        shown.map_err(|reason| {
            NotifierError::DeliveryFailed {
                notifier: "desktop".to_string(),
                reason,
            }
            .into()
        })
    }

    fn name(&self) -> &str {
        "desktop"
    }
}

/// Posts `{"text": ...}` to a chat-style incoming webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn payload(event: &MatchEvent) -> serde_json::Value {
        json!({
            "text": format!("{}\n{}", event.headline(), event.body()),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &MatchEvent) -> Result<(), CoreError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::payload(event))
            .send()
            .await
            .map_err(|e| NotifierError::DeliveryFailed {
                notifier: "webhook".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Rejected {
                notifier: "webhook".to_string(),
                status_code: status.as_u16(),
            }
            .into());
        }

        debug!("Webhook accepted alert for {}", event.item.id);
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

/// Writes alerts to the log only.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &MatchEvent) -> Result<(), CoreError> {
        info!(
            item_id = %event.item.id,
            keyword = %event.keyword,
            "{} | {}",
            event.headline(),
            event.body().replace('\n', " | ")
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

pub fn build_notifier(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, CoreError> {
    let notifier: Arc<dyn Notifier> = match config.kind {
        NotifierKind::Desktop => Arc::new(DesktopNotifier::new(config.app_name.clone())),
        NotifierKind::Webhook => {
            let url = config
                .webhook_url
                .clone()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "notifier.webhook_url".to_string(),
                })?;
            Arc::new(WebhookNotifier::new(url, config.timeout())?)
        }
        NotifierKind::Log => Arc::new(LogNotifier),
    };

    info!("Using {} notifier", notifier.name());
    Ok(notifier)
}
