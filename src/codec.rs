// CLASSIFICATION: COMMUNITY
// Filename: codec.rs v0.5
// Author: Lukas Bower
// Date Modified: 2026-05-30

//! SCXQ2 codec.
//!
//! Two deterministic stages: a static-dictionary substitution with an
//! explicit escape byte, then base64 for JSON transport. The escape
//! discipline makes the substitution bijective, so decode(encode(x))
//! is x for every input. The dictionary is fixed; changing it is a
//! wire-format change.

use crate::error::{ErrorKind, HostResult};
use crate::host_bail;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Escape byte introducing a dictionary reference or a literal escape.
const ESC: u8 = 0x01;
/// Dictionary indices are offset into printable space.
const IDX_BASE: u8 = 0x20;

/// Substitution dictionary, envelope-flavoured. Longest match wins at
/// each input position.
const DICTIONARY: &[&str] = &[
    "{\"program\":{\"type\":\"",
    "\",\"input\":{",
    "{\"ok\":true,\"result\":",
    "{\"ok\":false,\"error\":\"",
    "\"permissions\":{",
    "\"capabilities\":[",
    "\"confidence\":",
    "\"backend\":\"",
    "\"version\":\"",
    "\"context\":",
    "\"verdict\":\"",
    "\"message\":\"",
    "\"status\":\"",
    "\"result\":",
    "\"error\":\"",
    "\"agents\":[",
    "\"name\":\"",
    "\"tape\":\"",
    "https://",
    "http://",
    "\"id\":\"",
    "false",
    "true",
    "null",
    "\":\"",
    "\",\"",
    "{\"",
    "\"}",
    "\":",
    ",\"",
];

/// Encoding outcome with size accounting.
#[derive(Debug, Clone, Serialize)]
pub struct Encoded {
    pub data: String,
    pub raw_size: usize,
    pub encoded_size: usize,
    pub transport_size: usize,
    pub ratio: f64,
}

/// Encode a string through both stages.
pub fn encode(input: &str) -> Encoded {
    let substituted = substitute(input.as_bytes());
    let packed = BASE64.encode(&substituted);
    let raw_size = input.len();
    let encoded_size = substituted.len();
    Encoded {
        transport_size: packed.len(),
        data: packed,
        raw_size,
        encoded_size,
        ratio: if encoded_size > 0 {
            raw_size as f64 / encoded_size as f64
        } else {
            1.0
        },
    }
}

/// Decode a transport string back to the original text.
pub fn decode(packed: &str) -> HostResult<String> {
    let substituted = BASE64
        .decode(packed.trim())
        .map_err(|e| crate::host_err!(ErrorKind::BadRequest, "invalid scxq2 transport: {e}"))?;
    let raw = unsubstitute(&substituted)?;
    String::from_utf8(raw)
        .map_err(|e| crate::host_err!(ErrorKind::BadRequest, "scxq2 payload is not utf-8: {e}"))
}

/// Size and fingerprint report without returning the encoded payload.
#[derive(Debug, Clone, Serialize)]
pub struct CodecStats {
    pub raw_size: usize,
    pub encoded_size: usize,
    pub transport_size: usize,
    pub ratio: f64,
    pub sha256: String,
}

pub fn stats(input: &str) -> CodecStats {
    let encoded = encode(input);
    let digest = Sha256::digest(input.as_bytes());
    CodecStats {
        raw_size: encoded.raw_size,
        encoded_size: encoded.encoded_size,
        transport_size: encoded.transport_size,
        ratio: encoded.ratio,
        sha256: hex::encode(digest),
    }
}

fn substitute(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    'outer: while i < input.len() {
        if input[i] == ESC {
            out.push(ESC);
            out.push(0x00);
            i += 1;
            continue;
        }
        let mut best: Option<(usize, usize)> = None;
        for (idx, entry) in DICTIONARY.iter().enumerate() {
            let bytes = entry.as_bytes();
            if input[i..].starts_with(bytes) {
                match best {
                    Some((_, len)) if len >= bytes.len() => {}
                    _ => best = Some((idx, bytes.len())),
                }
            }
        }
        if let Some((idx, len)) = best {
            out.push(ESC);
            out.push(IDX_BASE + idx as u8);
            i += len;
            continue 'outer;
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

fn unsubstitute(input: &[u8]) -> HostResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 2);
    let mut i = 0;
    while i < input.len() {
        if input[i] != ESC {
            out.push(input[i]);
            i += 1;
            continue;
        }
        let Some(&code) = input.get(i + 1) else {
            host_bail!(ErrorKind::BadRequest, "dangling scxq2 escape");
        };
        if code == 0x00 {
            out.push(ESC);
        } else {
            let idx = code.wrapping_sub(IDX_BASE) as usize;
            match DICTIONARY.get(idx) {
                Some(entry) => out.extend_from_slice(entry.as_bytes()),
                None => host_bail!(ErrorKind::BadRequest, "scxq2 reference {code} out of range"),
            }
        }
        i += 2;
    }
    Ok(out)
}
