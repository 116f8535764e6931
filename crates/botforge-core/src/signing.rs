//! Webhook payload signing.
//!
//! Receivers verify authenticity by recomputing an HMAC-SHA256 over the
//! canonical JSON form of the payload. Canonicalization sorts object keys
//! recursively and uses compact separators, so both sides produce identical
//! bytes regardless of how the payload map was built.

use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Serialize a JSON value with recursively sorted object keys and no
/// whitespace. This is the byte form covered by the signature.
pub fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json string serialization handles escaping
                out.push_str(&JsonValue::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Compute the lowercase hex HMAC-SHA256 signature of `payload` under
/// `secret`, over the canonical JSON byte form.
pub fn sign_payload(secret: &str, payload: &JsonValue) -> Result<String> {
    let body = canonical_json(payload);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("HMAC key setup failed: {}", e)))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
