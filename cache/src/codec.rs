//! Payload encoding for cache entries.
//!
//! Values are serialized to JSON when they are plain scalars/containers
//! and stored as opaque bytes otherwise. Serialized payloads at or above
//! the threshold are gzip-compressed, but only kept compressed when the
//! compressed form is smaller than the original.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Json,
    Binary,
}

/// Sidecar metadata stored next to every payload, under the same TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub compressed: bool,
    pub created_at: DateTime<Utc>,
    pub size_original: usize,
    pub size_stored: usize,
}

#[derive(Debug, Clone)]
pub struct Encoded {
    pub payload: Vec<u8>,
    pub metadata: EntryMetadata,
}

impl Encoded {
    pub fn saved_bytes(&self) -> usize {
        self.metadata
            .size_original
            .saturating_sub(self.metadata.size_stored)
    }
}

/// Compress-if-worthwhile encoding of an already-serialized payload.
pub fn encode(raw: Vec<u8>, kind: PayloadKind, threshold: usize, level: u32) -> Result<Encoded> {
    let size_original = raw.len();

    let (payload, compressed) = if size_original >= threshold {
        let candidate = gzip(&raw, level)?;
        if candidate.len() < size_original {
            (candidate, true)
        } else {
            (raw, false)
        }
    } else {
        (raw, false)
    };

    Ok(Encoded {
        metadata: EntryMetadata {
            kind,
            compressed,
            created_at: Utc::now(),
            size_original,
            size_stored: payload.len(),
        },
        payload,
    })
}

/// Reverse of [`encode`]: returns the original serialized bytes.
///
/// A missing sidecar is treated as an uncompressed payload so that
/// entries whose metadata expired a beat earlier still deserialize.
pub fn decode(payload: Vec<u8>, metadata: Option<&EntryMetadata>) -> Result<Vec<u8>> {
    match metadata {
        Some(meta) if meta.compressed => gunzip(&payload),
        _ => Ok(payload),
    }
}

fn gzip(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .context("gzip write failed for cache payload")?;
    encoder.finish().context("gzip finish failed")
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .context("gzip decompression failed for cache payload")?;
    Ok(out)
}
