use attr_bridge::{AttributeBridge, AttributeProvider, BroadcastReporter, SubscriptionManager};
use attr_core::{
    callback_fn, AttributeFlags, AttributePath, AttributeValue, BridgeConfig, CallbackType, Error,
    MemoryStorage,
};
use attr_tlv::{Tag, TlvWriter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ON_OFF: AttributePath = AttributePath::new(1, 0x0006, 0x0000);
const CURRENT_LEVEL: AttributePath = AttributePath::new(1, 0x0008, 0x0000);
const NODE_LABEL: AttributePath = AttributePath::new(0, 0x0028, 0x0005);
const MEASURED_TEMPERATURE: AttributePath = AttributePath::new(2, 0x0402, 0x0000);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,attr_bridge=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Attribute bridge demo starting...");

    // Configuration
    let config = match std::env::var("ATTR_BRIDGE_CONFIG") {
        Ok(json) => BridgeConfig::from_json(&json)?,
        Err(_) => BridgeConfig {
            lock_timeout_ms: Some(500),
            deferred_persistence_ms: 2000,
            ..BridgeConfig::default()
        },
    };
    tracing::info!("Configuration: {}", serde_json::to_string(&config)?);

    let reporter = Arc::new(BroadcastReporter::default());
    let storage = Arc::new(MemoryStorage::new());
    let bridge = Arc::new(
        AttributeBridge::new(config.clone(), reporter.clone()).with_storage(storage.clone()),
    );

    create_light(&bridge)?;

    // Subscriber printing every change on endpoint 1 and the temperature sensor
    let mut subscriptions = SubscriptionManager::new();
    subscriptions.subscribe("1/*")?;
    subscriptions.subscribe("2/0x0402/0")?;
    let mut subscriber = reporter.subscriber(subscriptions);
    let subscriber_handle = tokio::spawn(async move {
        while let Some(change) = subscriber.recv().await {
            match serde_json::to_string(&change) {
                Ok(json) => tracing::info!("Change: {}", json),
                Err(e) => tracing::error!("Failed to serialize change: {}", e),
            }
        }
    });

    // Persist deferred attributes once they settle
    let flush_bridge = bridge.clone();
    let flush_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(
            (config.deferred_persistence_delay() / 2).max(Duration::from_millis(100)),
        );
        loop {
            interval.tick().await;
            if let Err(e) = flush_bridge.flush_settled(Instant::now()) {
                tracing::error!("Deferred persistence failed: {}", e);
            }
        }
    });

    // Demo device activity
    let demo_bridge = bridge.clone();
    let demo_handle = tokio::spawn(async move {
        if let Err(e) = run_light(demo_bridge).await {
            tracing::error!("Demo device stopped: {}", e);
        }
    });

    tracing::info!("Attribute bridge ready, press Ctrl+C to stop");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = subscriber_handle => {
            tracing::warn!("Change subscriber stopped");
        }
        _ = flush_handle => {
            tracing::warn!("Deferred persistence task stopped");
        }
        _ = demo_handle => {
            tracing::warn!("Demo device stopped");
        }
    }

    let flushed = bridge.flush_deferred()?;
    tracing::info!(
        "Shutdown complete ({} deferred attributes flushed, {} storage writes)",
        flushed,
        storage.write_count()
    );
    Ok(())
}

/// Create the attributes of a dimmable light with a temperature sensor.
fn create_light(bridge: &Arc<AttributeBridge>) -> anyhow::Result<()> {
    bridge.create_attribute(
        ON_OFF,
        AttributeFlags::WRITABLE | AttributeFlags::NONVOLATILE,
        &AttributeValue::boolean(false),
        None,
    )?;

    bridge.create_attribute(
        CURRENT_LEVEL,
        AttributeFlags::WRITABLE | AttributeFlags::NONVOLATILE,
        &AttributeValue::nullable_uint8(Some(1)),
        None,
    )?;
    bridge.add_bounds(
        &CURRENT_LEVEL,
        AttributeValue::nullable_uint8(Some(1)),
        AttributeValue::nullable_uint8(Some(254)),
    )?;
    bridge.set_deferred_persistence(&CURRENT_LEVEL)?;

    bridge.create_attribute(
        NODE_LABEL,
        AttributeFlags::WRITABLE,
        &AttributeValue::char_string("demo light"),
        Some(32),
    )?;

    bridge.create_attribute(
        MEASURED_TEMPERATURE,
        AttributeFlags::empty(),
        &AttributeValue::nullable_int16(None),
        None,
    )?;

    // Reject level changes while the light is off
    let weak = Arc::downgrade(bridge);
    bridge.set_callback(callback_fn(move |callback_type, path, value| {
        if callback_type != CallbackType::PreUpdate || *path != CURRENT_LEVEL {
            return Ok(());
        }
        let Some(bridge) = weak.upgrade() else {
            return Ok(());
        };
        let on = bridge.with_attribute(&ON_OFF, |a| a.value().as_bool())?;
        if on == Some(false) {
            return Err(Error::Failure(format!("light is off, ignoring level {value}")));
        }
        Ok(())
    }));

    Ok(())
}

/// Toggle the light, ramp its level and report temperature readings.
async fn run_light(bridge: Arc<AttributeBridge>) -> anyhow::Result<()> {
    let provider = AttributeProvider::new(bridge.clone());
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(1));
    let mut tick: u32 = 0;

    loop {
        interval.tick().await;
        tick += 1;

        let on = tick % 4 != 0;
        bridge.update(1, 0x0006, 0x0000, Some(&AttributeValue::boolean(on)))?;

        let level = ((tick * 37) % 254 + 1) as u8;
        let level_value = AttributeValue::nullable_uint8(Some(level));
        if let Err(e) = bridge.update(1, 0x0008, 0x0000, Some(&level_value)) {
            tracing::warn!("Level update rejected: {}", e);
        }

        // Sensor readings are pushed with a forced report, in 0.01 degrees
        let temperature = 2150 + ((tick % 10) as i16 - 5) * 10;
        bridge.report(
            2,
            0x0402,
            0x0000,
            Some(&AttributeValue::nullable_int16(Some(temperature))),
        )?;

        let mut writer = TlvWriter::new();
        provider.read_attribute(&CURRENT_LEVEL, &mut writer, Tag::Context(1))?;
        let hex: String = writer.as_bytes().iter().map(|b| format!("{b:02X}")).collect();
        tracing::info!("Read {} as TLV {}", CURRENT_LEVEL, hex);

        let label = bridge.get(&NODE_LABEL)?;
        tracing::debug!("Node label: {}", label.value());
    }
}
