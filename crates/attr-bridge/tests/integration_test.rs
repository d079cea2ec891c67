//! Integration tests for the attribute bridge.
//!
//! These tests drive a bridge end to end: values enter through `update`,
//! `report` or TLV provider writes, and leave through change notifications,
//! provider reads and persistent storage.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tokio::time::timeout;

use attr_bridge::{
    AttributeBridge, AttributeChange, AttributeProvider, BroadcastReporter, ChangeOrigin,
    ChangeSubscriber, SubscriptionManager,
};
use attr_core::{
    callback_fn, AttributeFlags, AttributePath, AttributeValue, BridgeConfig, CallbackType, Error,
    MemoryStorage, PersistenceStorage, ValueKind,
};
use attr_tlv::{Tag, TlvReader, TlvWrite, TlvWriter};

const ON_OFF: AttributePath = AttributePath::new(1, 0x0006, 0x0000);
const CURRENT_LEVEL: AttributePath = AttributePath::new(1, 0x0008, 0x0000);
const NODE_LABEL: AttributePath = AttributePath::new(0, 0x0028, 0x0005);
const SERIAL: AttributePath = AttributePath::new(0, 0x0028, 0x000F);
const TEMPERATURE: AttributePath = AttributePath::new(2, 0x0402, 0x0000);

/// Build a light with a temperature sensor on a broadcast reporter.
fn start_test_bridge(
    config: BridgeConfig,
) -> (Arc<AttributeBridge>, BroadcastReporter, Arc<MemoryStorage>) {
    let reporter = BroadcastReporter::new(64);
    let storage = Arc::new(MemoryStorage::new());
    let bridge =
        AttributeBridge::new(config, Arc::new(reporter.clone())).with_storage(storage.clone());

    bridge
        .create_attribute(
            ON_OFF,
            AttributeFlags::WRITABLE | AttributeFlags::NONVOLATILE,
            &AttributeValue::boolean(false),
            None,
        )
        .unwrap();
    bridge
        .create_attribute(
            CURRENT_LEVEL,
            AttributeFlags::WRITABLE,
            &AttributeValue::nullable_uint8(Some(1)),
            None,
        )
        .unwrap();
    bridge
        .create_attribute(
            NODE_LABEL,
            AttributeFlags::WRITABLE,
            &AttributeValue::char_string(""),
            Some(32),
        )
        .unwrap();
    bridge
        .create_attribute(
            TEMPERATURE,
            AttributeFlags::empty(),
            &AttributeValue::nullable_int16(None),
            None,
        )
        .unwrap();

    (Arc::new(bridge), reporter, storage)
}

fn subscriber(reporter: &BroadcastReporter, patterns: &[&str]) -> ChangeSubscriber {
    let mut subscriptions = SubscriptionManager::new();
    for pattern in patterns {
        subscriptions.subscribe(pattern).unwrap();
    }
    reporter.subscriber(subscriptions)
}

/// Wait for the next matching change with a timeout.
async fn recv_change(subscriber: &mut ChangeSubscriber) -> Result<AttributeChange, &'static str> {
    match timeout(Duration::from_secs(5), subscriber.recv()).await {
        Ok(Some(change)) => Ok(change),
        Ok(None) => Err("Reporter closed"),
        Err(_) => Err("Timeout"),
    }
}

fn tlv(write: impl FnOnce(&mut TlvWriter)) -> Vec<u8> {
    let mut writer = TlvWriter::new();
    write(&mut writer);
    writer.into_bytes()
}

// ============================================================================
// Update / report notifications
// ============================================================================

#[tokio::test]
async fn test_update_publishes_change() {
    let (bridge, reporter, _) = start_test_bridge(BridgeConfig::default());
    let mut changes = subscriber(&reporter, &["1/*"]);

    bridge
        .update(1, 0x0006, 0x0000, Some(&AttributeValue::boolean(true)))
        .unwrap();

    let change = recv_change(&mut changes).await.unwrap();
    assert_eq!(
        change,
        AttributeChange {
            path: ON_OFF,
            origin: ChangeOrigin::Update,
        }
    );
}

#[tokio::test]
async fn test_unchanged_update_is_silent() {
    let (bridge, reporter, _) = start_test_bridge(BridgeConfig::default());
    let mut changes = subscriber(&reporter, &["*"]);

    bridge
        .update(1, 0x0006, 0x0000, Some(&AttributeValue::boolean(false)))
        .unwrap();
    assert!(changes.try_recv().is_none());
}

#[tokio::test]
async fn test_report_always_publishes() {
    let (bridge, reporter, _) = start_test_bridge(BridgeConfig::default());
    let mut changes = subscriber(&reporter, &["2/0x0402/0"]);

    let reading = AttributeValue::nullable_int16(Some(2150));
    bridge.report(2, 0x0402, 0x0000, Some(&reading)).unwrap();
    bridge.report(2, 0x0402, 0x0000, Some(&reading)).unwrap();

    for _ in 0..2 {
        let change = recv_change(&mut changes).await.unwrap();
        assert_eq!(change.path, TEMPERATURE);
        assert_eq!(change.origin, ChangeOrigin::Report);
    }
    assert_eq!(bridge.get(&TEMPERATURE).unwrap().value().as_i16(), Some(2150));
}

#[tokio::test]
async fn test_subscription_filters_other_endpoints() {
    let (bridge, reporter, _) = start_test_bridge(BridgeConfig::default());
    let mut changes = subscriber(&reporter, &["0/*"]);

    bridge
        .update(1, 0x0006, 0x0000, Some(&AttributeValue::boolean(true)))
        .unwrap();
    bridge
        .update(0, 0x0028, 0x0005, Some(&AttributeValue::char_string("porch")))
        .unwrap();

    let change = recv_change(&mut changes).await.unwrap();
    assert_eq!(change.path, NODE_LABEL);
}

// ============================================================================
// Argument handling
// ============================================================================

#[test]
fn test_update_without_value_leaves_store_untouched() {
    let (bridge, reporter, storage) = start_test_bridge(BridgeConfig::default());
    let mut changes = subscriber(&reporter, &["*"]);

    assert!(matches!(
        bridge.update(1, 0x0006, 0x0000, None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(!bridge.lock().is_held_by_current_thread());
    assert_eq!(bridge.get(&ON_OFF).unwrap().value().as_bool(), Some(false));
    assert_eq!(storage.write_count(), 0);
    assert!(changes.try_recv().is_none());
}

#[test]
fn test_unknown_attribute() {
    let (bridge, _, _) = start_test_bridge(BridgeConfig::default());
    let missing = AttributePath::new(1, 0x0300, 0x0007);
    let value = AttributeValue::uint16(300);
    assert_eq!(
        bridge.update(1, 0x0300, 0x0007, Some(&value)),
        Err(Error::NotFound(missing))
    );
    assert_eq!(
        bridge.report(1, 0x0300, 0x0007, Some(&value)),
        Err(Error::NotFound(missing))
    );
    assert!(matches!(bridge.get(&missing), Err(Error::NotFound(_))));
}

#[test]
fn test_duplicate_attribute_rejected() {
    let (bridge, _, _) = start_test_bridge(BridgeConfig::default());
    let on = AttributeValue::boolean(true);
    assert!(matches!(
        bridge.create_attribute(ON_OFF, AttributeFlags::WRITABLE, &on, None),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        bridge.create_attribute(SERIAL, AttributeFlags::empty(), &AttributeValue::invalid(), None),
        Err(Error::InvalidArgument(_))
    ));
}

// ============================================================================
// Callbacks
// ============================================================================

#[test]
fn test_pre_update_rejection() {
    let (bridge, reporter, _) = start_test_bridge(BridgeConfig::default());
    let mut changes = subscriber(&reporter, &["*"]);
    let post_updates = Arc::new(AtomicUsize::new(0));
    let counter = post_updates.clone();

    bridge.set_callback(callback_fn(move |callback_type, path, value| {
        match callback_type {
            CallbackType::PreUpdate if *path == CURRENT_LEVEL && value.is_null() => {
                Err(Error::Failure("level must not be null".to_string()))
            }
            CallbackType::PostUpdate => {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            _ => Ok(()),
        }
    }));

    let result = bridge.update(1, 0x0008, 0x0000, Some(&AttributeValue::nullable_uint8(None)));
    assert_eq!(result, Err(Error::Failure("level must not be null".to_string())));
    assert_eq!(bridge.get(&CURRENT_LEVEL).unwrap().value().as_u8(), Some(1));
    assert_eq!(post_updates.load(Ordering::SeqCst), 0);
    assert!(changes.try_recv().is_none());
    assert!(!bridge.lock().is_held_by_current_thread());

    bridge
        .update(1, 0x0008, 0x0000, Some(&AttributeValue::nullable_uint8(Some(100))))
        .unwrap();
    assert_eq!(post_updates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_post_update_failure_is_not_fatal() {
    let (bridge, _, _) = start_test_bridge(BridgeConfig::default());
    bridge.set_callback(callback_fn(|callback_type, _, _| match callback_type {
        CallbackType::PostUpdate => Err(Error::Failure("driver offline".to_string())),
        _ => Ok(()),
    }));

    bridge
        .update(1, 0x0006, 0x0000, Some(&AttributeValue::boolean(true)))
        .unwrap();
    assert_eq!(bridge.get(&ON_OFF).unwrap().value().as_bool(), Some(true));
}

#[test]
fn test_concurrent_updates_are_serialized() {
    let config = BridgeConfig {
        lock_timeout_ms: Some(5_000),
        ..BridgeConfig::default()
    };
    let (bridge, _, _) = start_test_bridge(config);
    let in_callback = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let (active, seen) = (in_callback.clone(), overlaps.clone());

    bridge.set_callback(callback_fn(move |callback_type, _, _| {
        match callback_type {
            CallbackType::PreUpdate => {
                if active.fetch_add(1, Ordering::SeqCst) != 0 {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            }
            CallbackType::PostUpdate => {
                active.fetch_sub(1, Ordering::SeqCst);
            }
            _ => {}
        }
        Ok(())
    }));

    let handles: Vec<_> = (1..=8u8)
        .map(|thread| {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                for step in 0..25u8 {
                    let level = AttributeValue::nullable_uint8(Some(thread * 25 + step));
                    bridge.update(1, 0x0008, 0x0000, Some(&level)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(in_callback.load(Ordering::SeqCst), 0);
}

#[test]
fn test_lock_timeout() {
    let config = BridgeConfig {
        lock_timeout_ms: Some(20),
        ..BridgeConfig::default()
    };
    let (bridge, _, _) = start_test_bridge(config);
    let guard = bridge.lock().acquire(None).unwrap();

    let other = bridge.clone();
    let result = std::thread::spawn(move || {
        other.update(1, 0x0006, 0x0000, Some(&AttributeValue::boolean(true)))
    })
    .join()
    .unwrap();
    assert_eq!(result, Err(Error::LockFailed));

    drop(guard);
    assert_eq!(bridge.get(&ON_OFF).unwrap().value().as_bool(), Some(false));
}

// ============================================================================
// Provider
// ============================================================================

#[tokio::test]
async fn test_provider_write_round_trip() {
    let (bridge, reporter, _) = start_test_bridge(BridgeConfig::default());
    let provider = AttributeProvider::new(bridge.clone());
    let mut changes = subscriber(&reporter, &["0/0x28/*"]);

    let bytes = tlv(|w| w.put_string(Tag::Context(1), b"abc").unwrap());
    let mut reader = TlvReader::new(&bytes);
    reader.next().unwrap();
    provider.write_attribute(&NODE_LABEL, &reader).unwrap();

    assert_eq!(recv_change(&mut changes).await.unwrap().path, NODE_LABEL);

    let mut writer = TlvWriter::new();
    provider
        .read_attribute(&NODE_LABEL, &mut writer, Tag::Context(1))
        .unwrap();
    assert_eq!(writer.as_bytes(), bytes.as_slice());
}

#[test]
fn test_provider_null_write() {
    let (bridge, _, _) = start_test_bridge(BridgeConfig::default());
    let provider = AttributeProvider::new(bridge.clone());

    let bytes = tlv(|w| w.put_null(Tag::Anonymous).unwrap());
    let mut reader = TlvReader::new(&bytes);
    reader.next().unwrap();

    provider.write_attribute(&CURRENT_LEVEL, &reader).unwrap();
    assert!(bridge.get(&CURRENT_LEVEL).unwrap().is_null());

    // Booleans are not nullable
    assert!(provider.write_attribute(&ON_OFF, &reader).is_err());

    let mut writer = TlvWriter::new();
    provider
        .read_attribute(&CURRENT_LEVEL, &mut writer, Tag::Context(1))
        .unwrap();
    assert_eq!(writer.as_bytes(), &[0x34, 0x01]);
}

#[test]
fn test_provider_oversized_string() {
    let (bridge, _, _) = start_test_bridge(BridgeConfig::default());
    let provider = AttributeProvider::new(bridge.clone());

    let long = [b'x'; 40];
    let bytes = tlv(|w| w.put_string(Tag::Anonymous, &long).unwrap());
    let mut reader = TlvReader::new(&bytes);
    reader.next().unwrap();

    assert_eq!(provider.write_attribute(&NODE_LABEL, &reader), Err(Error::NoMemory));
    assert_eq!(bridge.get(&NODE_LABEL).unwrap().value().as_str(), Some(""));
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_nonvolatile_survives_restart() {
    let (bridge, _, storage) = start_test_bridge(BridgeConfig::default());
    bridge
        .update(1, 0x0006, 0x0000, Some(&AttributeValue::boolean(true)))
        .unwrap();
    assert_eq!(storage.load_value(&ON_OFF).unwrap(), vec![1]);

    let reporter = Arc::new(BroadcastReporter::default());
    let restarted =
        AttributeBridge::new(BridgeConfig::default(), reporter).with_storage(storage.clone());
    restarted
        .create_attribute(
            ON_OFF,
            AttributeFlags::WRITABLE | AttributeFlags::NONVOLATILE,
            &AttributeValue::boolean(false),
            None,
        )
        .unwrap();
    assert_eq!(restarted.get(&ON_OFF).unwrap().value().as_bool(), Some(true));
}

#[test]
fn test_corrupt_stored_value_keeps_default() {
    let storage = Arc::new(MemoryStorage::new());
    storage.store_value(&SERIAL, &[0x05, b'a']).unwrap();

    let reporter = Arc::new(BroadcastReporter::default());
    let bridge = AttributeBridge::new(BridgeConfig::default(), reporter).with_storage(storage);
    bridge
        .create_attribute(
            SERIAL,
            AttributeFlags::NONVOLATILE,
            &AttributeValue::char_string("SN-0001"),
            None,
        )
        .unwrap();
    assert_eq!(bridge.get(&SERIAL).unwrap().value().as_str(), Some("SN-0001"));
}

#[test]
fn test_deferred_persistence_batches_writes() {
    let config = BridgeConfig {
        deferred_persistence_ms: 1_000,
        ..BridgeConfig::default()
    };
    let (bridge, _, storage) = start_test_bridge(config);
    bridge.set_deferred_persistence(&ON_OFF).unwrap();
    assert!(matches!(
        bridge.set_deferred_persistence(&CURRENT_LEVEL),
        Err(Error::InvalidArgument(_))
    ));

    for i in 0..10 {
        let on = AttributeValue::boolean(i % 2 == 0);
        bridge.update(1, 0x0006, 0x0000, Some(&on)).unwrap();
    }
    assert_eq!(storage.write_count(), 0);
    assert!(!storage.has_value(&ON_OFF));

    assert_eq!(bridge.flush_settled(Instant::now()).unwrap(), 0);
    let settled = Instant::now() + Duration::from_secs(2);
    assert_eq!(bridge.flush_settled(settled).unwrap(), 1);
    assert_eq!(storage.write_count(), 1);
    assert_eq!(storage.load_value(&ON_OFF).unwrap(), vec![0]);
}

// ============================================================================
// Raw copies
// ============================================================================

#[test]
fn test_get_raw_limits() {
    let config = BridgeConfig {
        attribute_buffer_largest: 8,
        ..BridgeConfig::default()
    };
    let (bridge, _, _) = start_test_bridge(config);
    bridge
        .update(0, 0x0028, 0x0005, Some(&AttributeValue::char_string("hall")))
        .unwrap();

    let mut out = [0u8; 16];
    assert_eq!(bridge.get_raw(&NODE_LABEL, &mut out).unwrap(), 5);
    assert_eq!(&out[..5], &[4, b'h', b'a', b'l', b'l']);

    bridge
        .update(0, 0x0028, 0x0005, Some(&AttributeValue::char_string("front hall")))
        .unwrap();
    assert_eq!(
        bridge.get_raw(&NODE_LABEL, &mut out),
        Err(Error::BufferTooSmall {
            required: 11,
            available: 8,
        })
    );
}

#[test]
fn test_get_raw_reads_override() {
    let (bridge, _, _) = start_test_bridge(BridgeConfig::default());
    let path = AttributePath::new(1, 0x0008, 0x0011);
    bridge
        .create_attribute(path, AttributeFlags::WRITABLE, &AttributeValue::uint8(0), None)
        .unwrap();
    bridge
        .set_override_callback(
            &path,
            callback_fn(|callback_type, _, value| {
                if callback_type == CallbackType::Read {
                    *value = AttributeValue::uint8(77);
                }
                Ok(())
            }),
        )
        .unwrap();

    assert_eq!(bridge.get(&path).unwrap().value().as_u8(), Some(77));
    let mut out = [0u8; 4];
    assert_eq!(bridge.get_raw(&path, &mut out).unwrap(), 1);
    assert_eq!(out[0], 77);
    assert_eq!(bridge.with_attribute(&path, |a| a.value().as_u8()).unwrap(), Some(0));

    // An override that produces nothing is a failure, not the stored value
    bridge
        .set_override_callback(&CURRENT_LEVEL, callback_fn(|_, _, _| Ok(())))
        .unwrap();
    assert!(matches!(
        bridge.get_raw(&CURRENT_LEVEL, &mut out),
        Err(Error::Failure(_))
    ));
}

#[test]
fn test_array_attribute_read() {
    let (bridge, _, _) = start_test_bridge(BridgeConfig::default());
    let items = [1u8, 0, 2, 0];
    let path = AttributePath::new(0, 0x001D, 0x0000);
    bridge
        .create_attribute(path, AttributeFlags::empty(), &AttributeValue::array(&items, 2), None)
        .unwrap();

    let stored = bridge.get(&path).unwrap();
    assert_eq!(stored.kind(), ValueKind::Array);
    let value = stored.value();
    let buf = value.as_buf().unwrap();
    assert_eq!(buf.count(), 2);
    assert_eq!(buf.data(), Some(&items[..]));

    let provider = AttributeProvider::new(bridge.clone());
    let mut writer = TlvWriter::new();
    assert_eq!(
        provider.read_attribute(&path, &mut writer, Tag::Anonymous),
        Err(Error::Unsupported(ValueKind::Array))
    );
}
