//! Change notification towards the interaction-model engine.
//!
//! The bridge calls a [`ChangeReporter`] after every committed change. The
//! [`BroadcastReporter`] fans changes out on a tokio broadcast channel, and a
//! [`ChangeSubscriber`] filters them with the path patterns of a
//! [`SubscriptionManager`].

use attr_core::{AttributePath, PathPattern, PatternError};
use serde::{Deserialize, Serialize};

/// Hooks the engine exposes for attribute changes.
pub trait ChangeReporter: Send + Sync {
    /// An attribute changed through `update` or a provider write.
    fn report_attribute_changed(&self, path: &AttributePath);

    /// The application forced a report through `report`.
    fn reporting_attribute_change(&self, endpoint: u16, cluster: u32, attribute: u32);
}

/// Which bridge operation produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOrigin {
    Update,
    Report,
}

/// A committed attribute change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeChange {
    pub path: AttributePath,
    pub origin: ChangeOrigin,
}

/// Attribute subscriptions of one consumer.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionManager {
    patterns: Vec<PathPattern>,
}

impl SubscriptionManager {
    /// Create a manager with no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every attribute.
    pub fn subscribe_all(&mut self) {
        self.patterns.clear();
        self.patterns.push(PathPattern::all());
    }

    /// Subscribe to nothing (clear all subscriptions).
    pub fn subscribe_none(&mut self) {
        self.patterns.clear();
    }

    /// Add a subscription pattern such as `"1/0x6/*"`.
    pub fn subscribe(&mut self, pattern: &str) -> Result<(), PatternError> {
        let pattern = PathPattern::new(pattern)?;
        if !self.patterns.iter().any(|p| p.as_str() == pattern.as_str()) {
            self.patterns.push(pattern);
        }
        Ok(())
    }

    /// Remove a subscription pattern. Returns whether it was present.
    pub fn unsubscribe(&mut self, pattern: &str) -> bool {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.as_str() != pattern.trim());
        before != self.patterns.len()
    }

    pub fn has_subscriptions(&self) -> bool {
        !self.patterns.is_empty()
    }

    /// Check if any subscription matches the path.
    pub fn matches(&self, path: &AttributePath) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

#[cfg(feature = "broadcast")]
pub use broadcast_impl::{BroadcastReporter, ChangeSubscriber};

#[cfg(feature = "broadcast")]
mod broadcast_impl {
    use super::*;
    use tokio::sync::broadcast;
    use tracing::{debug, warn};

    /// Reporter that publishes changes on a broadcast channel.
    #[derive(Debug, Clone)]
    pub struct BroadcastReporter {
        tx: broadcast::Sender<AttributeChange>,
    }

    impl BroadcastReporter {
        pub fn new(capacity: usize) -> Self {
            let (tx, _) = broadcast::channel(capacity);
            Self { tx }
        }

        /// Subscribe to the raw change stream.
        pub fn subscribe(&self) -> broadcast::Receiver<AttributeChange> {
            self.tx.subscribe()
        }

        /// Subscribe with path filtering.
        pub fn subscriber(&self, subscriptions: SubscriptionManager) -> ChangeSubscriber {
            ChangeSubscriber {
                rx: self.tx.subscribe(),
                subscriptions,
            }
        }

        fn publish(&self, change: AttributeChange) {
            if self.tx.send(change).is_err() {
                debug!("No change subscribers");
            }
        }
    }

    impl Default for BroadcastReporter {
        fn default() -> Self {
            Self::new(1024)
        }
    }

    impl ChangeReporter for BroadcastReporter {
        fn report_attribute_changed(&self, path: &AttributePath) {
            self.publish(AttributeChange {
                path: *path,
                origin: ChangeOrigin::Update,
            });
        }

        fn reporting_attribute_change(&self, endpoint: u16, cluster: u32, attribute: u32) {
            self.publish(AttributeChange {
                path: AttributePath::new(endpoint, cluster, attribute),
                origin: ChangeOrigin::Report,
            });
        }
    }

    /// A filtered view of the change stream.
    pub struct ChangeSubscriber {
        rx: broadcast::Receiver<AttributeChange>,
        subscriptions: SubscriptionManager,
    }

    impl ChangeSubscriber {
        pub fn subscriptions_mut(&mut self) -> &mut SubscriptionManager {
            &mut self.subscriptions
        }

        /// Wait for the next change matching a subscription.
        ///
        /// Returns `None` once the reporter is dropped.
        pub async fn recv(&mut self) -> Option<AttributeChange> {
            loop {
                match self.rx.recv().await {
                    Ok(change) if self.subscriptions.matches(&change.path) => return Some(change),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Change subscriber lagged {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }

        /// Take a pending matching change without waiting.
        pub fn try_recv(&mut self) -> Option<AttributeChange> {
            loop {
                match self.rx.try_recv() {
                    Ok(change) if self.subscriptions.matches(&change.path) => return Some(change),
                    Ok(_) => continue,
                    Err(broadcast::error::TryRecvError::Lagged(n)) => {
                        warn!("Change subscriber lagged {} messages", n);
                    }
                    Err(_) => return None,
                }
            }
        }
    }
}
