// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

crate::define_id! {
    /// Test-only ID type.
    pub struct SampleId("smpl-");
}

#[test]
fn generated_ids_carry_prefix_and_length() {
    let id = SampleId::new();
    assert!(id.as_str().starts_with("smpl-"));
    assert_eq!(id.as_str().len(), ID_MAX_LEN);
}

#[test]
fn generated_ids_are_unique() {
    let a = SampleId::new();
    let b = SampleId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_roundtrip() {
    let id = SampleId::from_string("smpl-abc");
    assert_eq!(id.as_str(), "smpl-abc");
    assert_eq!(id, "smpl-abc");
}

#[test]
fn serde_is_transparent() {
    let id = SampleId::from_string("smpl-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"smpl-xyz\"");
    let back: SampleId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn idbuf_truncates_on_char_boundary() {
    // 12 two-byte chars = 24 bytes; adding one more must not split a char.
    let s = "éééééééééééé é";
    let buf = IdBuf::new(s);
    assert!(buf.as_str().len() <= ID_MAX_LEN);
    assert!(s.starts_with(buf.as_str()));
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdef", 3), "abc");
    assert_eq!(short("ab", 3), "ab");
}

#[test]
fn empty_idbuf() {
    let buf = IdBuf::empty();
    assert!(buf.is_empty());
    assert_eq!(buf.as_str(), "");
}
