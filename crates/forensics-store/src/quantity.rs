//! Native-unit quantities and the lenient decoders used at ingestion.
//!
//! Upstream RPC clients hand over values either already converted to
//! integers or still as raw `0x` hex strings. Everything in the store is
//! kept as [`U256`] wei; snapshots write values back as decimal strings so
//! amounts above `u64::MAX` survive a JSON round-trip unchanged.
//!
//! Plain JSON integers wider than 64 bits are read exactly: serde_json is
//! built with `arbitrary_precision`, which hands such numbers over as their
//! literal digits instead of a lossy float.

use std::fmt;

use alloy::primitives::U256;
use serde::de::{self, Expected, MapAccess, Unexpected, Visitor};
use serde::{Deserializer, Serializer};

/// One ether in wei (`10^18`).
pub const WEI_PER_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Values strictly above 100 ether (`100 * 10^18` wei) are flagged as large transfers.
pub const LARGE_TRANSFER_THRESHOLD: U256 = U256::from_limbs([0x6bc7_5e2d_6310_0000, 0x5, 0, 0]);

/// Parse a quantity given as decimal text or `0x`-prefixed hex.
///
/// Empty input and a bare `0x` both read as zero. Returns `None` for
/// anything that is not a valid unsigned 256-bit integer.
pub fn parse_quantity(value: &str) -> Option<U256> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        if hex.is_empty() {
            return Some(U256::ZERO);
        }
        return U256::from_str_radix(hex, 16).ok();
    }
    if trimmed.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(trimmed, 10).ok()
}

/// Parse a `u64` given as decimal text or `0x`-prefixed hex.
pub fn parse_u64(value: &str) -> Option<u64> {
    let quantity = parse_quantity(value)?;
    u64::try_from(quantity).ok()
}

/// Format a wei amount as ether with six decimals, truncating the rest.
pub fn format_eth(wei: U256) -> String {
    let whole = wei / WEI_PER_ETHER;
    let micro = (wei % WEI_PER_ETHER) / U256::from(1_000_000_000_000u64);
    let micro = u64::try_from(micro).unwrap_or_default();
    format!("{whole}.{micro:06} ETH")
}

/// Map key serde_json uses for numbers that do not fit a native integer.
const NUMBER_TOKEN: &str = "$serde_json::private::Number";

/// Literal digits of an arbitrary-precision JSON number.
fn number_text<'de, A: MapAccess<'de>>(mut map: A, exp: &dyn Expected) -> Result<String, A::Error> {
    match map.next_key::<String>()? {
        Some(key) if key == NUMBER_TOKEN => map.next_value(),
        _ => Err(de::Error::invalid_type(Unexpected::Map, exp)),
    }
}

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = U256;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned integer, a decimal string or a 0x-prefixed hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
        u64::try_from(v)
            .map(U256::from)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<U256, E> {
        Err(E::invalid_type(Unexpected::Float(v), &self))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
        parse_quantity(v).ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
    }

    // Numbers that do not fit a u64 arrive as their literal text.
    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<U256, A::Error> {
        let digits = number_text(map, &self)?;
        U256::from_str_radix(&digits, 10)
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(&digits), &self))
    }
}

struct TimestampVisitor;

impl<'de> Visitor<'de> for TimestampVisitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("epoch seconds as an integer, a decimal string or a 0x-prefixed hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
            Ok(v as u64)
        } else {
            Err(E::invalid_value(Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        parse_u64(v).ok_or_else(|| E::invalid_value(Unexpected::Str(v), &self))
    }

    // Float literals such as `1708603200.0` arrive as raw number text.
    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<u64, A::Error> {
        let text = number_text(map, &self)?;
        match text.parse::<f64>() {
            Ok(v) => self.visit_f64(v),
            Err(_) => Err(de::Error::invalid_value(Unexpected::Str(&text), &self)),
        }
    }
}

/// `#[serde(with = "quantity::wei")]`: decimal string out, lenient in.
pub mod wei {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// `#[serde(with = "quantity::epoch")]`: plain integer out, lenient in.
pub mod epoch {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_one_hundred_ether() {
        assert_eq!(
            LARGE_TRANSFER_THRESHOLD,
            U256::from(100u128 * 1_000_000_000_000_000_000u128)
        );
        assert_eq!(WEI_PER_ETHER, U256::from(1_000_000_000_000_000_000u64));
    }

    #[test]
    fn parse_quantity_cases() {
        assert_eq!(parse_quantity("0x"), Some(U256::ZERO));
        assert_eq!(parse_quantity(""), Some(U256::ZERO));
        assert_eq!(parse_quantity("0x64"), Some(U256::from(100)));
        assert_eq!(parse_quantity("0X64"), Some(U256::from(100)));
        assert_eq!(parse_quantity(" 250 "), Some(U256::from(250)));
        assert_eq!(
            parse_quantity("0x56bc75e2d63100000"),
            Some(LARGE_TRANSFER_THRESHOLD)
        );
        assert_eq!(parse_quantity("0xzz"), None);
        assert_eq!(parse_quantity("-5"), None);
    }

    #[test]
    fn parse_u64_rejects_overflow() {
        assert_eq!(parse_u64("0x10"), Some(16));
        assert_eq!(parse_u64("0x10000000000000000"), None);
    }

    #[test]
    fn format_eth_precision() {
        assert_eq!(format_eth(WEI_PER_ETHER), "1.000000 ETH");
        assert_eq!(format_eth(U256::from(500_000_000_000_000_000u64)), "0.500000 ETH");
        assert_eq!(format_eth(U256::from(1_000_000_000_000u64)), "0.000001 ETH");
        assert_eq!(format_eth(U256::from(123_456_000u64)), "0.000000 ETH");
        assert_eq!(format_eth(U256::ZERO), "0.000000 ETH");
        assert_eq!(format_eth(LARGE_TRANSFER_THRESHOLD), "100.000000 ETH");
    }

    #[test]
    fn lenient_decoders_accept_numbers_and_text() {
        #[derive(serde::Deserialize, serde::Serialize)]
        struct Probe {
            #[serde(with = "wei")]
            value: U256,
            #[serde(with = "epoch")]
            timestamp: u64,
        }

        let from_hex: Probe =
            serde_json::from_str(r#"{"value":"0xde0b6b3a7640000","timestamp":"0x10"}"#).unwrap();
        assert_eq!(from_hex.value, WEI_PER_ETHER);
        assert_eq!(from_hex.timestamp, 16);

        let from_numbers: Probe = serde_json::from_str(r#"{"value":42,"timestamp":3600}"#).unwrap();
        assert_eq!(from_numbers.value, U256::from(42));
        assert_eq!(from_numbers.timestamp, 3600);

        let json = serde_json::to_string(&from_numbers).unwrap();
        assert_eq!(json, r#"{"value":"42","timestamp":3600}"#);

        assert!(serde_json::from_str::<Probe>(r#"{"value":-1,"timestamp":0}"#).is_err());
        assert!(serde_json::from_str::<Probe>(r#"{"value":"nope","timestamp":0}"#).is_err());
    }

    #[test]
    fn wide_integers_decode_exactly() {
        #[derive(serde::Deserialize)]
        struct Amount {
            #[serde(with = "wei")]
            value: U256,
            #[serde(with = "epoch")]
            timestamp: u64,
        }

        let past_u64: Amount =
            serde_json::from_str(r#"{"value":150000000000000000000,"timestamp":1708603200.0}"#)
                .unwrap();
        assert_eq!(past_u64.value, U256::from(150_000_000_000_000_000_000u128));
        assert_eq!(past_u64.timestamp, 1_708_603_200);

        let past_u128: Amount = serde_json::from_str(
            r#"{"value":340282366920938463463374607431768211457,"timestamp":1}"#,
        )
        .unwrap();
        assert_eq!(past_u128.value, U256::from(u128::MAX) + U256::from(2));

        let from_value: Amount =
            serde_json::from_value(serde_json::json!({"value": 150000000000000000000u128, "timestamp": 1}))
                .unwrap();
        assert_eq!(from_value.value, U256::from(150_000_000_000_000_000_000u128));

        assert!(serde_json::from_str::<Amount>(r#"{"value":1.5,"timestamp":1}"#).is_err());
        assert!(serde_json::from_str::<Amount>(r#"{"value":1,"timestamp":1.5}"#).is_err());
    }
}
