//! Fuzz target for change-set payloads.
//!
//! Attribute values may hold any bytes; every change must still serialize to
//! a JSON body the sink can read.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_change_payload -- -max_total_time=600

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use xavyo_syncrepl::{AttributeMap, AttributeValue, ChangeEvent, ChangePayload, Entry};

/// Arbitrary input for a change event
#[derive(Arbitrary, Debug)]
struct ChangeInput {
    dn: String,
    old_dn: String,
    kind: u8,
    old: Vec<(String, Vec<Vec<u8>>)>,
    new: Vec<(String, Vec<Vec<u8>>)>,
}

fn attribute_map(raw: Vec<(String, Vec<Vec<u8>>)>) -> AttributeMap {
    raw.into_iter()
        .map(|(name, values)| {
            let values = values
                .into_iter()
                .map(|v| match String::from_utf8(v) {
                    Ok(text) => AttributeValue::Text(text),
                    Err(e) => AttributeValue::Binary(e.into_bytes()),
                })
                .collect();
            (name, values)
        })
        .collect()
}

fuzz_target!(|input: ChangeInput| {
    let old = attribute_map(input.old);
    let new = attribute_map(input.new);
    let event = match input.kind % 3 {
        0 => ChangeEvent::added(input.dn, new),
        1 => ChangeEvent::modified(input.dn, Entry::new(input.old_dn, old), new),
        _ => ChangeEvent::deleted(input.dn, old),
    };

    let payload = ChangePayload::from_event(&event);
    let body = serde_json::to_vec(&payload).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(value["dn"], event.dn.as_str());
    assert_eq!(value["change_type"], event.kind.as_str());
    assert!(value["old_attributes"].is_object());
    assert!(value["new_attributes"].is_object());
    if let Some(old_dn) = event.old_dn.as_deref() {
        assert_eq!(value["old_attributes"]["dn"], old_dn);
    }
});
