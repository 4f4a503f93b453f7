use netflow_codec::{
    FieldDictionary, FieldValue, NetflowDecoder, RawField, TemplateAck, TemplateKey,
    TemplateRegistry,
};

use std::fs;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Wire(Vec<u8>);

impl Wire {
    fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }
    fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }
    fn build(self) -> Vec<u8> {
        self.0
    }
}

/// IPFIX message with one template set declaring templates 256..=258, each a
/// single sourceIPv4Address field.
fn three_templates() -> Vec<u8> {
    Wire::default()
        .u16(10)
        .u16(44)
        .u32(1_700_000_000)
        .u32(1)
        .u32(7)
        .u16(2)
        .u16(28)
        .u16(256)
        .u16(1)
        .u16(8)
        .u16(4)
        .u16(257)
        .u16(1)
        .u16(8)
        .u16(4)
        .u16(258)
        .u16(1)
        .u16(8)
        .u16(4)
        .build()
}

fn data_for(template_id: u16) -> Vec<u8> {
    Wire::default()
        .u16(10)
        .u16(24)
        .u32(1_700_000_000)
        .u32(2)
        .u32(7)
        .u16(template_id)
        .u16(8)
        .u32(0x0102_0304)
        .build()
}

fn decoder_with_cache(dir: &std::path::Path) -> NetflowDecoder {
    NetflowDecoder::builder()
        .with_cache_save_path(dir)
        .build()
        .expect("defaults load")
}

#[test]
fn templates_survive_a_decoder_restart() {
    let dir = tempfile::tempdir().expect("temp dir");

    let first = decoder_with_cache(dir.path());
    first.decode(&three_templates(), Some("192.0.2.1"), |_, _| {});
    assert_eq!(first.ipfix_template_keys().len(), 3);
    assert!(dir.path().join("ipfix_templates.cache").exists());
    drop(first);

    // a new decoder on the same path decodes data without a fresh template
    let second = decoder_with_cache(dir.path());
    assert_eq!(second.ipfix_template_keys().len(), 3);

    let mut events = Vec::new();
    second.decode(&data_for(257), Some("192.0.2.1"), |_ts, event| events.push(event));
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0]["sourceIPv4Address"],
        FieldValue::Ip4Addr(std::net::Ipv4Addr::new(1, 2, 3, 4))
    );
}

#[test]
fn persisted_set_matches_live_set_after_reload() {
    let dir = tempfile::tempdir().expect("temp dir");

    let first = decoder_with_cache(dir.path());
    first.decode(&three_templates(), Some("192.0.2.1"), |_, _| {});
    first.persist_ipfix_templates();
    let mut live: Vec<TemplateKey> = first.ipfix_template_keys();
    drop(first);

    let second = decoder_with_cache(dir.path());
    let mut reloaded = second.ipfix_template_keys();
    live.sort_by_key(|k| k.template_id);
    reloaded.sort_by_key(|k| k.template_id);
    assert_eq!(live, reloaded);
}

#[test]
fn unreadable_cache_file_starts_empty() {
    let dir = tempfile::tempdir().expect("temp dir");
    fs::write(dir.path().join("ipfix_templates.cache"), b"not json at all")
        .expect("write garbage");

    // load failure is logged, not fatal
    let decoder = decoder_with_cache(dir.path());
    assert!(decoder.ipfix_template_keys().is_empty());

    // and the decoder still learns templates normally
    decoder.decode(&three_templates(), Some("192.0.2.1"), |_, _| {});
    assert_eq!(decoder.ipfix_template_keys().len(), 3);
}

#[test]
fn validator_rejection_writes_nothing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("templates.cache");
    let dictionary = FieldDictionary::ipfix(None).expect("built-in dictionary");
    let registry = TemplateRegistry::new(Duration::from_secs(60), Some(path.clone()));

    let reject = |_: &netflow_codec::Template| TemplateAck::Reject;
    let registered = registry.register(
        TemplateKey::new(None, 7, 256),
        &[RawField::new(8, 4)],
        &dictionary,
        Some(&reject),
    );
    assert!(registered.is_none());
    assert!(registry.is_empty());
    assert!(!path.exists());

    // the same template without the validator persists immediately
    registry.register(
        TemplateKey::new(None, 7, 256),
        &[RawField::new(8, 4)],
        &dictionary,
        None,
    );
    assert!(path.exists());
}

#[test]
fn persist_drops_expired_entries_from_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("templates.cache");
    let dictionary = FieldDictionary::ipfix(None).expect("built-in dictionary");
    let registry = TemplateRegistry::new(Duration::from_millis(50), Some(path.clone()));

    registry.register(
        TemplateKey::new(None, 7, 256),
        &[RawField::new(8, 4)],
        &dictionary,
        None,
    );
    thread::sleep(Duration::from_millis(80));
    registry.persist();

    let rewritten = TemplateRegistry::new(Duration::from_secs(60), Some(path));
    rewritten.load(&dictionary);
    assert!(rewritten.is_empty());
}
