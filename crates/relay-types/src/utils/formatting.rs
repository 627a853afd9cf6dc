//! String formatting utilities.
//!
//! Hex prefix handling, id truncation for log lines, and conversion between
//! base-unit integers and human-readable token amounts.

/// Truncates an id for display: the first 8 characters followed by "..".
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((idx, _)) => format!("{}..", &id[..idx]),
		None => id.to_string(),
	}
}

/// Adds a "0x" prefix to a hex string if it doesn't already have one.
pub fn with_0x_prefix(hex_str: &str) -> String {
	if hex_str.starts_with("0x") || hex_str.starts_with("0X") {
		hex_str.to_string()
	} else {
		format!("0x{}", hex_str)
	}
}

/// Removes a "0x" or "0X" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Formats a base-unit amount with `decimals` decimal places, trimming
/// trailing zeros ("1500000", 6 -> "1.5").
pub fn format_token_amount(amount: &str, decimals: u8) -> String {
	if decimals == 0 {
		return amount.to_string();
	}
	let places = decimals as usize;

	let (integer_part, fraction) = if amount.len() <= places {
		("0".to_string(), format!("{:0>width$}", amount, width = places))
	} else {
		let split = amount.len() - places;
		(amount[..split].to_string(), amount[split..].to_string())
	};

	let fraction = fraction.trim_end_matches('0');
	if fraction.is_empty() {
		integer_part
	} else {
		format!("{}.{}", integer_part, fraction)
	}
}

/// Converts a human-readable amount ("10.5") into a base-unit decimal string.
///
/// Returns `None` for malformed input or when the amount has more fractional
/// digits than the token supports.
pub fn parse_token_amount(amount: &str, decimals: u8) -> Option<String> {
	let places = decimals as usize;
	let (integer_part, fraction) = match amount.split_once('.') {
		Some((i, f)) => (i, f),
		None => (amount, ""),
	};
	if integer_part.is_empty() && fraction.is_empty() {
		return None;
	}
	let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
	if !all_digits(integer_part) || !all_digits(fraction) || fraction.len() > places {
		return None;
	}

	let combined = format!("{}{:0<width$}", integer_part, fraction, width = places);
	let trimmed = combined.trim_start_matches('0');
	Some(if trimmed.is_empty() {
		"0".to_string()
	} else {
		trimmed.to_string()
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("0x1234567890abcdef"), "0x123456..");
	}

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(with_0x_prefix("abcd"), "0xabcd");
		assert_eq!(with_0x_prefix("0Xabcd"), "0Xabcd");
		assert_eq!(without_0x_prefix("0xabcd"), "abcd");
		assert_eq!(without_0x_prefix("abcd"), "abcd");
	}

	#[test]
	fn test_format_token_amount() {
		assert_eq!(format_token_amount("10000000000000000000", 18), "10");
		assert_eq!(format_token_amount("100000000000000000", 18), "0.1");
		assert_eq!(format_token_amount("1500000", 6), "1.5");
		assert_eq!(format_token_amount("42", 0), "42");
	}

	#[test]
	fn test_parse_token_amount() {
		assert_eq!(
			parse_token_amount("10", 18).as_deref(),
			Some("10000000000000000000")
		);
		assert_eq!(
			parse_token_amount("0.1", 18).as_deref(),
			Some("100000000000000000")
		);
		assert_eq!(parse_token_amount("1.5", 6).as_deref(), Some("1500000"));
		assert_eq!(parse_token_amount("0", 9).as_deref(), Some("0"));
		assert_eq!(parse_token_amount("1.1234567", 6), None);
		assert_eq!(parse_token_amount("-1", 6), None);
		assert_eq!(parse_token_amount(".", 6), None);
	}
}
