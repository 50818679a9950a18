//! TTC wire encodings.
//!
//! Binary: each float is 9 bytes: a sentinel byte (0 = finite, 1 = +∞), a big-endian
//! u32 integer part and a big-endian u32 fractional part scaled by 2^32. With the
//! sentinel set, the trailing 8 bytes are zero on encode and ignored on decode. A triple
//! is three such floats in (min, left, right) order: 27 bytes.
//!
//! JSON: `{"min-ttc": .., "left-ttc": .., "right-ttc": ..}` with the string
//! `"Infinity"` standing in for +∞.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;

use crate::ttc::TtcTriple;

pub const FLOAT_BYTES: usize = 9;
pub const TRIPLE_BYTES: usize = 3 * FLOAT_BYTES;
pub const JSON_INFINITY: &str = "Infinity";

const SENTINEL_FINITE: u8 = 0;
const SENTINEL_INFINITY: u8 = 1;
const FRACTION_SCALE: f64 = 4_294_967_296.0;

/// Finite values must stay below this to fit the 32-bit integer part.
pub const FINITE_LIMIT: f64 = FRACTION_SCALE;

/// Encode a non-negative finite value or +∞.
pub fn encode_float(value: f64) -> Result<[u8; FLOAT_BYTES]> {
    let mut out = [0u8; FLOAT_BYTES];
    if value == f64::INFINITY {
        out[0] = SENTINEL_INFINITY;
        return Ok(out);
    }
    if !value.is_finite() || value < 0.0 {
        bail!("cannot encode {} (only non-negative values and +inf)", value);
    }
    if value >= FRACTION_SCALE {
        bail!("cannot encode {} (integer part exceeds 32 bits)", value);
    }
    let int_part = value.trunc();
    let frac_part = ((value - int_part) * FRACTION_SCALE).floor();
    out[0] = SENTINEL_FINITE;
    out[1..5].copy_from_slice(&(int_part as u32).to_be_bytes());
    out[5..9].copy_from_slice(&(frac_part as u32).to_be_bytes());
    Ok(out)
}

pub fn decode_float(bytes: &[u8]) -> Result<f64> {
    if bytes.len() != FLOAT_BYTES {
        bail!("encoded float must be {} bytes, got {}", FLOAT_BYTES, bytes.len());
    }
    match bytes[0] {
        SENTINEL_INFINITY => Ok(f64::INFINITY),
        SENTINEL_FINITE => {
            let int_part = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
            let frac_part = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
            Ok(int_part as f64 + frac_part as f64 / FRACTION_SCALE)
        }
        other => Err(anyhow!("unknown float sentinel {}", other)),
    }
}

/// Wire encoding of TTC triples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtcEncoding {
    #[default]
    Binary,
    Json,
}

impl FromStr for TtcEncoding {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(Self::Binary),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unknown ttc encoding '{}' (expected binary or json)", other)),
        }
    }
}

impl TtcEncoding {
    pub fn encode(self, triple: &TtcTriple) -> Result<Vec<u8>> {
        match self {
            Self::Binary => {
                let mut out = Vec::with_capacity(TRIPLE_BYTES);
                for value in [triple.min, triple.left, triple.right] {
                    out.extend_from_slice(&encode_float(value)?);
                }
                Ok(out)
            }
            Self::Json => {
                let body = json!({
                    "min-ttc": json_value(triple.min)?,
                    "left-ttc": json_value(triple.left)?,
                    "right-ttc": json_value(triple.right)?,
                });
                Ok(serde_json::to_vec(&body)?)
            }
        }
    }

    pub fn decode(self, payload: &[u8]) -> Result<TtcTriple> {
        match self {
            Self::Binary => {
                if payload.len() != TRIPLE_BYTES {
                    bail!("ttc triple must be {} bytes, got {}", TRIPLE_BYTES, payload.len());
                }
                Ok(TtcTriple {
                    min: decode_float(&payload[..FLOAT_BYTES])?,
                    left: decode_float(&payload[FLOAT_BYTES..2 * FLOAT_BYTES])?,
                    right: decode_float(&payload[2 * FLOAT_BYTES..])?,
                })
            }
            Self::Json => {
                let body: Value = serde_json::from_slice(payload).context("parse ttc json")?;
                Ok(TtcTriple {
                    min: json_field(&body, "min-ttc")?,
                    left: json_field(&body, "left-ttc")?,
                    right: json_field(&body, "right-ttc")?,
                })
            }
        }
    }
}

fn json_value(value: f64) -> Result<Value> {
    if value == f64::INFINITY {
        return Ok(Value::String(JSON_INFINITY.to_string()));
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| anyhow!("cannot encode {} as json", value))
}

fn json_field(body: &Value, key: &str) -> Result<f64> {
    match body.get(key) {
        Some(Value::String(s)) if s == JSON_INFINITY => Ok(f64::INFINITY),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| anyhow!("field '{}' is not representable as f64", key)),
        Some(other) => Err(anyhow!("field '{}' has unexpected value {}", key, other)),
        None => Err(anyhow!("field '{}' missing", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinity_round_trips_through_sentinel() {
        let bytes = encode_float(f64::INFINITY).unwrap();
        assert_eq!(bytes, [1, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(decode_float(&bytes).unwrap(), f64::INFINITY);
    }

    #[test]
    fn finite_value_splits_integer_and_fraction() {
        let bytes = encode_float(12.5).unwrap();
        assert_eq!(bytes, [0, 0, 0, 0, 12, 0x80, 0, 0, 0]);
        let decoded = decode_float(&bytes).unwrap();
        assert!((decoded - 12.5).abs() <= 1.0 / FRACTION_SCALE);
    }

    #[test]
    fn sentinel_ignores_trailing_bytes() {
        let bytes = [1u8, 0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4];
        assert_eq!(decode_float(&bytes).unwrap(), f64::INFINITY);
    }

    #[test]
    fn fraction_precision_is_two_to_minus_32() {
        let value = 3.141_592_653_589_793;
        let decoded = decode_float(&encode_float(value).unwrap()).unwrap();
        assert!((decoded - value).abs() <= 1.0 / FRACTION_SCALE);
    }

    #[test]
    fn rejects_unencodable_values() {
        assert!(encode_float(-1.0).is_err());
        assert!(encode_float(f64::NAN).is_err());
        assert!(encode_float(f64::NEG_INFINITY).is_err());
        assert!(encode_float(5e9).is_err());
        assert!(decode_float(&[2, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(decode_float(&[0, 0]).is_err());
    }

    #[test]
    fn binary_triple_is_27_bytes_in_order() {
        let triple = TtcTriple {
            min: 1.5,
            left: f64::INFINITY,
            right: 2.25,
        };
        let payload = TtcEncoding::Binary.encode(&triple).unwrap();
        assert_eq!(payload.len(), TRIPLE_BYTES);
        assert_eq!(payload[9], SENTINEL_INFINITY);
        assert_eq!(TtcEncoding::Binary.decode(&payload).unwrap(), triple);
        assert!(TtcEncoding::Binary.decode(&payload[..26]).is_err());
    }

    #[test]
    fn json_triple_uses_infinity_string() {
        let triple = TtcTriple {
            min: 0.75,
            left: 0.75,
            right: f64::INFINITY,
        };
        let payload = TtcEncoding::Json.encode(&triple).unwrap();
        let body: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(body["right-ttc"], Value::String("Infinity".to_string()));
        assert_eq!(body["min-ttc"].as_f64(), Some(0.75));
        assert_eq!(TtcEncoding::Json.decode(&payload).unwrap(), triple);
    }

    #[test]
    fn encoding_parses_from_config_strings() {
        assert_eq!("JSON".parse::<TtcEncoding>().unwrap(), TtcEncoding::Json);
        assert_eq!(" binary ".parse::<TtcEncoding>().unwrap(), TtcEncoding::Binary);
        assert!("base64".parse::<TtcEncoding>().is_err());
    }
}
