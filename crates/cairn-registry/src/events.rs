//! Registry lifecycle events
//!
//! Front ends subscribe to refresh their views. Publishing never fails:
//! events sent while nobody listens are dropped.

use cairn_core::types::InstalledBundle;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Events kept per lagging subscriber before the oldest are dropped
const CHANNEL_CAPACITY: usize = 64;

/// Something that changed in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RegistryEvent {
    /// A bundle was installed where no record existed for its scope
    BundleInstalled(InstalledBundle),
    /// An existing install record was replaced, by an update or a reinstall
    BundleUpdated(InstalledBundle),
    #[serde(rename_all = "camelCase")]
    BundleUninstalled { bundle_id: String },
    #[serde(rename_all = "camelCase")]
    SourceSynced { source_id: String, bundle_count: usize },
}

impl RegistryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::BundleInstalled(_) => "bundleInstalled",
            RegistryEvent::BundleUpdated(_) => "bundleUpdated",
            RegistryEvent::BundleUninstalled { .. } => "bundleUninstalled",
            RegistryEvent::SourceSynced { .. } => "sourceSynced",
        }
    }
}

/// Broadcast channel for [`RegistryEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RegistryEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RegistryEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => trace!("Published {} to {} subscribers", name, receivers),
            Err(_) => trace!("Dropped {}: no subscribers", name),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(RegistryEvent::BundleUninstalled {
            bundle_id: "acme-prompts".into(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            RegistryEvent::BundleUninstalled {
                bundle_id: "acme-prompts".into()
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(RegistryEvent::SourceSynced {
            source_id: "http-0123456789ab".into(),
            bundle_count: 3,
        });
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(RegistryEvent::SourceSynced {
            source_id: "http-0123456789ab".into(),
            bundle_count: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "sourceSynced");
        assert_eq!(json["sourceId"], "http-0123456789ab");
        assert_eq!(json["bundleCount"], 3);
    }
}
