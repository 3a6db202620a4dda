// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PII anonymization and the reversible lookup table.
//!
//! PII-like string fields are replaced with a deterministic HMAC-SHA256
//! keyed by a shared secret, so the same author maps to the same
//! pseudonym across entities. The hash→original mapping lands in an
//! append-only CSV unless privacy mode turns the table into a black
//! hole.

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

type HmacSha256 = Hmac<Sha256>;

/// Fields whose string values are replaced wholesale.
const PII_FIELDS: &[&str] = &[
    "author_name",
    "author_email",
    "email",
    "committer_name",
    "committer_email",
];

/// Append-only `hash,original` CSV with in-memory dedup.
pub struct LookupTable {
    path: Option<PathBuf>,
    seen: Mutex<HashSet<String>>,
    disabled: bool,
    warned: std::sync::atomic::AtomicBool,
}

impl LookupTable {
    pub fn new(path: Option<PathBuf>, disabled: bool) -> Self {
        Self {
            path,
            seen: Mutex::new(HashSet::new()),
            disabled,
            warned: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Record one mapping. In privacy mode this logs once and drops
    /// everything.
    pub fn record(&self, hash: &str, original: &str) {
        if self.disabled {
            if !self.warned.swap(true, std::sync::atomic::Ordering::Relaxed) {
                tracing::info!("lookup table disabled (privacy mode); mappings are discarded");
            }
            return;
        }
        let Some(path) = &self.path else { return };
        {
            let mut seen = self.seen.lock();
            if !seen.insert(hash.to_string()) {
                return;
            }
        }
        let line = format!("{hash},{}\n", original.replace(',', "\\,").replace('\n', " "));
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(err) = appended {
            tracing::warn!(path = %path.display(), error = %err, "lookup append failed");
        }
    }

    #[cfg(test)]
    fn seen_count(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Deterministic field scrubber.
pub struct Anonymizer {
    secret: Vec<u8>,
    lookup: LookupTable,
}

impl Anonymizer {
    pub fn new(secret: impl AsRef<[u8]>, lookup: LookupTable) -> Self {
        Self { secret: secret.as_ref().to_vec(), lookup }
    }

    /// HMAC-SHA256 of one value, hex-encoded.
    pub fn pseudonym(&self, original: &str) -> String {
        // An HMAC key of any length is valid for SHA-256.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(original.as_bytes());
        let digest = mac.finalize().into_bytes();
        digest.iter().fold(String::with_capacity(64), |mut out, byte| {
            use std::fmt::Write as _;
            let _ = write!(out, "{byte:02x}");
            out
        })
    }

    /// Replace PII fields everywhere in the tree, recording mappings.
    pub fn scrub(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, entry) in map.iter_mut() {
                    if PII_FIELDS.contains(&key.as_str()) {
                        if let Value::String(original) = entry {
                            let hashed = self.pseudonym(original);
                            self.lookup.record(&hashed, original);
                            *entry = Value::String(hashed);
                            continue;
                        }
                    }
                    self.scrub(entry);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.scrub(item);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
#[path = "anonymize_tests.rs"]
mod tests;
