//! Settlement references, receipts and relay outcomes.

use crate::{ChainFamily, Identity, PermitId};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain-native handle of a submitted transaction: a 32-byte hash on EVM, a
/// 64-byte transaction signature on SVM.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SettlementReference {
	pub family: ChainFamily,
	pub bytes: Vec<u8>,
}

impl SettlementReference {
	pub fn evm(hash: [u8; 32]) -> Self {
		Self {
			family: ChainFamily::Evm,
			bytes: hash.to_vec(),
		}
	}

	pub fn svm(signature: [u8; 64]) -> Self {
		Self {
			family: ChainFamily::Svm,
			bytes: signature.to_vec(),
		}
	}

	/// Parses the display form: `0x` hex for EVM, base58 for SVM.
	pub fn parse(value: &str) -> Option<Self> {
		if let Some(hex_part) = value.strip_prefix("0x") {
			let bytes = hex::decode(hex_part).ok()?;
			return (bytes.len() == 32).then_some(Self {
				family: ChainFamily::Evm,
				bytes,
			});
		}
		let bytes = bs58::decode(value).into_vec().ok()?;
		(bytes.len() == 64).then_some(Self {
			family: ChainFamily::Svm,
			bytes,
		})
	}
}

impl fmt::Display for SettlementReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.family {
			ChainFamily::Evm => write!(f, "0x{}", hex::encode(&self.bytes)),
			ChainFamily::Svm => f.write_str(&bs58::encode(&self.bytes).into_string()),
		}
	}
}

impl Serialize for SettlementReference {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for SettlementReference {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		SettlementReference::parse(&s)
			.ok_or_else(|| serde::de::Error::custom(format!("invalid settlement reference {}", s)))
	}
}

/// Confirmation data returned by an oracle client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
	pub reference: SettlementReference,
	/// Block number (EVM) or slot (SVM) the transaction landed in.
	pub block_number: u64,
	pub success: bool,
}

/// Outcome of a successful relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
	pub permit_id: PermitId,
	pub settlement_reference: SettlementReference,
	pub block_number: u64,
	pub receiver: Identity,
	#[serde(with = "crate::api::u256_serde")]
	pub amount: U256,
	#[serde(with = "crate::api::u256_serde")]
	pub fee: U256,
	/// Executor clock reading when confirmation was observed.
	pub settled_at: i64,
}

/// Machine-readable classification of a failed relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayErrorKind {
	EncodingError,
	ExpiredPermit,
	NonceAlreadyConsumed,
	SignatureRejected,
	InsufficientFunds,
	TransientSubmissionFailure,
	OracleRejected,
}

impl RelayErrorKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			RelayErrorKind::EncodingError => "encoding_error",
			RelayErrorKind::ExpiredPermit => "expired_permit",
			RelayErrorKind::NonceAlreadyConsumed => "nonce_already_consumed",
			RelayErrorKind::SignatureRejected => "signature_rejected",
			RelayErrorKind::InsufficientFunds => "insufficient_funds",
			RelayErrorKind::TransientSubmissionFailure => "transient_submission_failure",
			RelayErrorKind::OracleRejected => "oracle_rejected",
		}
	}
}

impl fmt::Display for RelayErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Lifecycle of a permit as tracked by the relayer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelayStatus {
	/// Accepted and being processed.
	Pending,
	/// Settled on chain.
	Settled { receipt: ExecutionReceipt },
	/// Failed with a classified error.
	Failed {
		kind: RelayErrorKind,
		message: String,
	},
}

impl RelayStatus {
	pub fn is_final(&self) -> bool {
		!matches!(self, RelayStatus::Pending)
	}
}
