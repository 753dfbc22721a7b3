// CLASSIFICATION: COMMUNITY
// Filename: scxq2.rs v0.3
// Author: Lukas Bower
// Date Modified: 2026-06-24

//! SCXQ2 codec handlers. `data` may be a string or any JSON value;
//! non-strings are canonically serialised before encoding.

use super::CallContext;
use crate::codec;
use crate::error::{ErrorKind, HostResult};
use crate::host::Host;
use crate::host_bail;
use serde_json::{json, Value};

fn text_of(input: &Value) -> HostResult<String> {
    match input.get("data") {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => serde_json::to_string(other).map_err(|e| {
            crate::host_err!(ErrorKind::BadRequest, "data not encodable: {e}")
        }),
        None => host_bail!(ErrorKind::BadRequest, "scxq2 requires a data field"),
    }
}

pub fn encode(_host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let text = text_of(input)?;
    let encoded = codec::encode(&text);
    Ok(json!({
        "encoded": encoded.data,
        "raw_size": encoded.raw_size,
        "encoded_size": encoded.encoded_size,
        "transport_size": encoded.transport_size,
        "ratio": encoded.ratio,
    }))
}

pub fn decode(_host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let packed = match input.get("data").and_then(Value::as_str) {
        Some(packed) => packed,
        None => host_bail!(ErrorKind::BadRequest, "scxq2_decode requires a data string"),
    };
    let decoded = codec::decode(packed)?;
    Ok(json!({
        "decoded": decoded,
        "size": decoded.len(),
    }))
}

pub fn stats(_host: &Host, input: &Value, _ctx: &mut CallContext) -> HostResult<Value> {
    let text = text_of(input)?;
    let stats = codec::stats(&text);
    serde_json::to_value(&stats)
        .map_err(|e| crate::host_err!(ErrorKind::BadRequest, "stats not encodable: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;
    use clap::Parser;

    fn test_host() -> Host {
        let dir = tempfile::tempdir().expect("tempdir");
        let cli = Cli::parse_from(["ghostd", "--root", dir.path().to_str().expect("path"), "--port", "0"]);
        let config = crate::config::resolve(&cli).expect("config");
        std::mem::forget(dir);
        Host::new(config).expect("host")
    }

    #[test]
    fn encode_decode_through_handlers() {
        let host = test_host();
        let mut ctx = CallContext::default();
        let payload = json!({"data": {"id": "alpha", "version": "1.0.0"}});
        let encoded = encode(&host, &payload, &mut ctx).expect("encode");
        let decoded = decode(
            &host,
            &json!({"data": encoded["encoded"]}),
            &mut ctx,
        )
        .expect("decode");
        let round: Value =
            serde_json::from_str(decoded["decoded"].as_str().expect("text")).expect("json");
        assert_eq!(round, json!({"id": "alpha", "version": "1.0.0"}));
    }

    #[test]
    fn stats_reports_ratio_and_hash() {
        let host = test_host();
        let mut ctx = CallContext::default();
        let stats = stats(&host, &json!({"data": "some payload"}), &mut ctx).expect("stats");
        assert!(stats["ratio"].as_f64().expect("ratio") > 0.0);
        assert_eq!(stats["sha256"].as_str().expect("hash").len(), 64);
    }

    #[test]
    fn missing_data_is_bad_request() {
        let host = test_host();
        let mut ctx = CallContext::default();
        assert_eq!(
            encode(&host, &json!({}), &mut ctx).unwrap_err().kind,
            ErrorKind::BadRequest
        );
    }
}
