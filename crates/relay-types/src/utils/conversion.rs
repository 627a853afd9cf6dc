//! Conversions between wire strings and fixed-width integers or bytes.
//!
//! Decimal strings are the wire format for every 256-bit quantity. Parsing is
//! strict: only ASCII digits are accepted, and narrowing never truncates.

use super::formatting::without_0x_prefix;
use crate::EncodingError;
use alloy_primitives::U256;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Parses a base-10 string into a `U256`.
///
/// Rejects empty strings, signs, whitespace, hex and values above `2^256 - 1`.
pub fn parse_decimal_u256(field: &'static str, value: &str) -> Result<U256, EncodingError> {
	if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
		return Err(EncodingError::InvalidInteger {
			field,
			value: value.to_string(),
		});
	}
	U256::from_str_radix(value, 10).map_err(|_| EncodingError::OutOfRange {
		field,
		width: "uint256",
		value: value.to_string(),
	})
}

/// Narrows a `U256` to `u64`, failing instead of truncating.
pub fn u256_to_u64(field: &'static str, value: U256) -> Result<u64, EncodingError> {
	u64::try_from(value).map_err(|_| EncodingError::OutOfRange {
		field,
		width: "u64",
		value: value.to_string(),
	})
}

/// Decodes a signature written as hex (with or without `0x`) or base64.
///
/// Hex is tried first; a string with an odd number of characters or with
/// non-hex characters falls back to base64.
pub fn decode_signature(value: &str) -> Result<Vec<u8>, EncodingError> {
	let trimmed = value.trim();
	if trimmed.is_empty() {
		return Err(EncodingError::MissingField("signature"));
	}
	let hex_part = without_0x_prefix(trimmed);
	if hex_part.len() % 2 == 0 && hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
		if let Ok(bytes) = hex::decode(hex_part) {
			return Ok(bytes);
		}
	}
	STANDARD
		.decode(trimmed)
		.map_err(|e| EncodingError::InvalidSignature(format!("neither hex nor base64: {}", e)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_decimal_u256() {
		assert_eq!(
			parse_decimal_u256("amount", "10000000000000000000").unwrap(),
			U256::from(10_000_000_000_000_000_000u128)
		);
		assert_eq!(parse_decimal_u256("amount", "0").unwrap(), U256::ZERO);

		for bad in ["", "-1", "1.5", "0x10", " 1", "1e18"] {
			assert!(
				matches!(
					parse_decimal_u256("amount", bad),
					Err(EncodingError::InvalidInteger { field: "amount", .. })
				),
				"accepted {:?}",
				bad
			);
		}
	}

	#[test]
	fn test_parse_decimal_u256_overflow() {
		let too_big = format!("{}0", U256::MAX);
		assert!(matches!(
			parse_decimal_u256("fee", &too_big),
			Err(EncodingError::OutOfRange { field: "fee", .. })
		));
	}

	#[test]
	fn test_u256_to_u64() {
		assert_eq!(u256_to_u64("amount", U256::from(u64::MAX)).unwrap(), u64::MAX);
		assert!(u256_to_u64("amount", U256::from(u64::MAX) + U256::from(1u8)).is_err());
	}

	#[test]
	fn test_decode_signature_formats() {
		let bytes = vec![0xde, 0xad, 0xbe, 0xef];
		assert_eq!(decode_signature("0xdeadbeef").unwrap(), bytes);
		assert_eq!(decode_signature("DEADBEEF").unwrap(), bytes);
		assert_eq!(decode_signature(&STANDARD.encode(&bytes)).unwrap(), bytes);
		assert!(decode_signature("!!!").is_err());
		assert!(matches!(
			decode_signature(""),
			Err(EncodingError::MissingField("signature"))
		));
	}
}
