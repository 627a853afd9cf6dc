//! Encoding errors.
//!
//! Every failure to turn caller-supplied values into a canonical permit ends
//! up here. These are raised before any network interaction and are never
//! retried.

use crate::ChainFamily;
use thiserror::Error;

/// Errors that occur while parsing, validating or encoding permit parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
	/// A field expected to hold a decimal integer did not parse.
	#[error("Invalid integer for field '{field}': {value:?}")]
	InvalidInteger { field: &'static str, value: String },
	/// A value does not fit the fixed width used by the canonical encoding.
	#[error("Field '{field}' does not fit {width}: {value}")]
	OutOfRange {
		field: &'static str,
		width: &'static str,
		value: String,
	},
	/// `amount + fee` exceeds the native integer width of the chain.
	#[error("amount + fee overflows {0}")]
	Overflow(&'static str),
	/// An identity string could not be parsed.
	#[error("Invalid identity for field '{field}': {message}")]
	InvalidIdentity { field: &'static str, message: String },
	/// Identities from different chain families were mixed in one permit.
	#[error("Field '{field}' is a {actual} identity, expected {expected}")]
	FamilyMismatch {
		field: &'static str,
		expected: ChainFamily,
		actual: ChainFamily,
	},
	/// The signature is malformed or has the wrong length.
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	/// The declared signer is not the permit owner.
	#[error("Declared signer {signer} does not match owner {owner}")]
	SignerMismatch { signer: String, owner: String },
	/// A field required by the chosen operation is absent.
	#[error("Missing field: {0}")]
	MissingField(&'static str),
	/// A value is syntactically valid but rejected by a protocol rule.
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: &'static str, message: String },
}
