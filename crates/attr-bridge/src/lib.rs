//! # attr-bridge
//!
//! Synchronized access to the attribute store.
//!
//! This crate provides:
//! - [`AttributeBridge`]: get/set/update/report under a re-entrant processing lock
//! - [`AttributeProvider`]: TLV reads and writes for the interaction-model engine
//! - Change notification through [`ChangeReporter`], with a tokio broadcast
//!   implementation filtered by path patterns
//!
//! ## Example
//!
//! ```rust,ignore
//! use attr_bridge::{AttributeBridge, BroadcastReporter};
//! use attr_core::{AttributeFlags, AttributeValue, BridgeConfig};
//! use std::sync::Arc;
//!
//! let reporter = Arc::new(BroadcastReporter::default());
//! let bridge = AttributeBridge::new(BridgeConfig::default(), reporter.clone());
//! bridge.create_attribute(
//!     (1, 6, 0).into(),
//!     AttributeFlags::WRITABLE,
//!     &AttributeValue::boolean(false),
//!     None,
//! )?;
//! bridge.update(1, 6, 0, Some(&AttributeValue::boolean(true)))?;
//! ```

pub mod bridge;
pub mod lock;
pub mod notify;
pub mod provider;

pub use bridge::AttributeBridge;
pub use lock::{LockStatus, StackLock, StackLockGuard};
pub use notify::{AttributeChange, ChangeOrigin, ChangeReporter, SubscriptionManager};
#[cfg(feature = "broadcast")]
pub use notify::{BroadcastReporter, ChangeSubscriber};
pub use provider::AttributeProvider;
