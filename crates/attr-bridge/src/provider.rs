//! Wire-side adapter between the interaction-model engine and the bridge.

use crate::bridge::AttributeBridge;
use attr_core::{AttributePath, Result};
use attr_tlv::{Tag, TlvRead, TlvWrite};
use std::sync::Arc;
use tracing::debug;

/// Serves attribute reads and writes arriving as TLV.
#[derive(Clone)]
pub struct AttributeProvider {
    bridge: Arc<AttributeBridge>,
}

impl AttributeProvider {
    pub fn new(bridge: Arc<AttributeBridge>) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &Arc<AttributeBridge> {
        &self.bridge
    }

    /// Encode the current value of `path` as one element tagged `tag`.
    pub fn read_attribute<W: TlvWrite + ?Sized>(
        &self,
        path: &AttributePath,
        writer: &mut W,
        tag: Tag,
    ) -> Result<()> {
        debug!("Read request for {}", path);
        let _guard = self.bridge.lock().acquire(self.bridge.config().lock_timeout())?;
        self.bridge.encode_value(path, writer, tag)
    }

    /// Decode the reader's current element and apply it to `path`.
    ///
    /// The reader must be positioned on the element. Changes are reported to
    /// the engine exactly as for [`AttributeBridge::update`].
    pub fn write_attribute<R: TlvRead + ?Sized>(
        &self,
        path: &AttributePath,
        reader: &R,
    ) -> Result<()> {
        debug!("Write request for {}", path);
        self.bridge.decode_and_update(path, reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChangeReporter;
    use attr_core::{callback_fn, AttributeFlags, AttributeValue, BridgeConfig, CallbackType, Error};
    use attr_tlv::{TlvReader, TlvWriter};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    const ON_OFF: AttributePath = AttributePath::new(1, 0x0006, 0x0000);
    const NAME: AttributePath = AttributePath::new(0, 0x0028, 0x0005);

    #[derive(Default)]
    struct Changes(Mutex<Vec<AttributePath>>);

    impl ChangeReporter for Changes {
        fn report_attribute_changed(&self, path: &AttributePath) {
            self.0.lock().unwrap().push(*path);
        }

        fn reporting_attribute_change(&self, _endpoint: u16, _cluster: u32, _attribute: u32) {}
    }

    fn provider() -> (AttributeProvider, Arc<Changes>) {
        let changes = Arc::new(Changes::default());
        let bridge = AttributeBridge::new(BridgeConfig::default(), changes.clone());
        bridge
            .create_attribute(
                ON_OFF,
                AttributeFlags::WRITABLE,
                &AttributeValue::boolean(false),
                None,
            )
            .unwrap();
        bridge
            .create_attribute(
                NAME,
                AttributeFlags::WRITABLE,
                &AttributeValue::char_string("lamp"),
                Some(32),
            )
            .unwrap();
        (AttributeProvider::new(Arc::new(bridge)), changes)
    }

    #[test]
    fn test_read_attribute() {
        let (provider, _) = provider();
        let mut writer = TlvWriter::new();
        provider
            .read_attribute(&ON_OFF, &mut writer, Tag::Context(1))
            .unwrap();
        assert_eq!(writer.as_bytes(), &[0x28, 0x01]);

        let mut writer = TlvWriter::new();
        provider.read_attribute(&NAME, &mut writer, Tag::Anonymous).unwrap();
        assert_eq!(writer.as_bytes(), &[0x0C, 0x04, b'l', b'a', b'm', b'p']);
    }

    #[test]
    fn test_read_missing_attribute() {
        let (provider, _) = provider();
        let mut writer = TlvWriter::new();
        let missing = AttributePath::new(7, 7, 7);
        assert_eq!(
            provider.read_attribute(&missing, &mut writer, Tag::Anonymous),
            Err(Error::NotFound(missing))
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn test_write_attribute_notifies() {
        let (provider, changes) = provider();
        let mut writer = TlvWriter::new();
        writer.put_string(Tag::Anonymous, b"desk lamp").unwrap();
        let bytes = writer.into_bytes();
        let mut reader = TlvReader::new(&bytes);
        reader.next().unwrap();

        provider.write_attribute(&NAME, &reader).unwrap();
        assert_eq!(*changes.0.lock().unwrap(), vec![NAME]);
        assert_eq!(
            provider.bridge().get(&NAME).unwrap().value().as_str(),
            Some("desk lamp")
        );
    }

    #[test]
    fn test_write_wrong_element_type() {
        let (provider, changes) = provider();
        let mut writer = TlvWriter::new();
        writer.put_unsigned(Tag::Anonymous, 1).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = TlvReader::new(&bytes);
        reader.next().unwrap();

        assert!(provider.write_attribute(&ON_OFF, &reader).is_err());
        assert!(changes.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_override_read_without_value_fails() {
        let (provider, _) = provider();
        provider
            .bridge()
            .set_override_callback(&ON_OFF, callback_fn(|_, _, _| Ok(())))
            .unwrap();
        let mut writer = TlvWriter::new();
        assert!(matches!(
            provider.read_attribute(&ON_OFF, &mut writer, Tag::Anonymous),
            Err(Error::Failure(_))
        ));
    }

    #[test]
    fn test_override_read_and_write() {
        let (provider, changes) = provider();
        let state = Arc::new(Mutex::new(true));
        let shared = state.clone();
        provider
            .bridge()
            .set_override_callback(
                &ON_OFF,
                callback_fn(move |callback_type, _, value| {
                    let mut state = shared.lock().unwrap();
                    match callback_type {
                        CallbackType::Read => *value = AttributeValue::boolean(*state),
                        CallbackType::Write => *state = value.as_bool().unwrap_or(false),
                        _ => {}
                    }
                    Ok(())
                }),
            )
            .unwrap();

        let mut writer = TlvWriter::new();
        provider.read_attribute(&ON_OFF, &mut writer, Tag::Anonymous).unwrap();
        assert_eq!(writer.as_bytes(), &[0x09]);

        let mut writer = TlvWriter::new();
        writer.put_bool(Tag::Anonymous, false).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = TlvReader::new(&bytes);
        reader.next().unwrap();
        provider.write_attribute(&ON_OFF, &reader).unwrap();

        assert!(!*state.lock().unwrap());
        assert_eq!(*changes.0.lock().unwrap(), vec![ON_OFF]);
    }
}
