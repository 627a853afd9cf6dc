//! JSON wire record for signed permits.
//!
//! This is the opaque record a signer hands to a relayer. Quantities are
//! decimal strings so 256-bit values survive JSON number limits; `deadline`
//! is a plain integer. Parsing re-validates everything and yields a
//! [`SignedPermit`].

use crate::utils::{decode_signature, parse_decimal_u256};
use crate::{EncodingError, Identity, PermitParameters, PermitSignature, SignedPermit};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitRecord {
	pub owner: String,
	pub verifier: String,
	pub asset: String,
	pub amount: String,
	pub fee: String,
	pub deadline: i64,
	pub nonce: String,
	pub signature: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub receiver: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signer: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub digest: Option<String>,
}

impl PermitRecord {
	/// Renders a signed permit in wire form.
	pub fn from_signed(permit: &SignedPermit) -> Self {
		let p = &permit.parameters;
		Self {
			owner: p.owner.to_string(),
			verifier: p.verifier.to_string(),
			asset: p.asset.to_string(),
			amount: p.amount.to_string(),
			fee: p.fee.to_string(),
			deadline: p.deadline,
			nonce: p.nonce.to_string(),
			signature: permit.signature.to_hex(),
			receiver: permit.receiver.map(|r| r.to_string()),
			signer: Some(permit.signer.to_string()),
			digest: permit
				.claimed_digest
				.map(|d| format!("0x{}", hex::encode(d))),
		}
	}

	/// Validates the record and builds a [`SignedPermit`].
	///
	/// The signer defaults to the owner when absent; a signer that differs
	/// from the owner is rejected.
	pub fn to_signed(&self) -> Result<SignedPermit, EncodingError> {
		let owner = Identity::parse("owner", &self.owner)?;
		let family = owner.family();
		let verifier = Identity::parse_as(family, "verifier", &self.verifier)?;
		let asset = Identity::parse_as(family, "asset", &self.asset)?;

		let parameters = PermitParameters::new(
			owner,
			verifier,
			asset,
			parse_decimal_u256("amount", &self.amount)?,
			parse_decimal_u256("fee", &self.fee)?,
			self.deadline,
			parse_decimal_u256("nonce", &self.nonce)?,
		)?;

		let signer = match &self.signer {
			Some(s) => Identity::parse("signer", s)?,
			None => owner,
		};
		let signature = PermitSignature::new(decode_signature(&self.signature)?);
		let mut permit = SignedPermit::new(parameters, signature, signer)?;

		if let Some(receiver) = &self.receiver {
			permit = permit.with_receiver(Identity::parse_as(family, "receiver", receiver)?)?;
		}
		if let Some(digest) = &self.digest {
			permit.claimed_digest = Some(parse_digest(digest)?);
		}
		Ok(permit)
	}

	pub fn to_json(&self) -> Result<String, EncodingError> {
		serde_json::to_string_pretty(self).map_err(|e| EncodingError::InvalidValue {
			field: "record",
			message: e.to_string(),
		})
	}

	/// Parses JSON text into a validated [`SignedPermit`].
	pub fn parse_json(json: &str) -> Result<SignedPermit, EncodingError> {
		let record: PermitRecord =
			serde_json::from_str(json).map_err(|e| EncodingError::InvalidValue {
				field: "record",
				message: e.to_string(),
			})?;
		record.to_signed()
	}
}

fn parse_digest(value: &str) -> Result<B256, EncodingError> {
	let bytes = hex::decode(crate::without_0x_prefix(value)).map_err(|e| {
		EncodingError::InvalidValue {
			field: "digest",
			message: e.to_string(),
		}
	})?;
	if bytes.len() != 32 {
		return Err(EncodingError::InvalidValue {
			field: "digest",
			message: format!("expected 32 bytes, got {}", bytes.len()),
		});
	}
	Ok(B256::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{ChainFamily, Pubkey};
	use alloy_primitives::U256;

	fn svm_record() -> PermitRecord {
		PermitRecord {
			owner: Pubkey([1u8; 32]).to_string(),
			verifier: Pubkey([2u8; 32]).to_string(),
			asset: Pubkey([3u8; 32]).to_string(),
			amount: "1000000000".to_string(),
			fee: "1000".to_string(),
			deadline: 1_700_000_600,
			nonce: "42".to_string(),
			signature: format!("0x{}", "ab".repeat(64)),
			receiver: Some(Pubkey([4u8; 32]).to_string()),
			signer: None,
			digest: None,
		}
	}

	#[test]
	fn test_record_to_signed() {
		let permit = svm_record().to_signed().unwrap();
		assert_eq!(permit.family(), ChainFamily::Svm);
		assert_eq!(permit.parameters.amount, U256::from(1_000_000_000u64));
		assert_eq!(permit.parameters.nonce, U256::from(42u64));
		assert_eq!(permit.signer, permit.parameters.owner);
		assert_eq!(permit.receiver, Some(Identity::Svm(Pubkey([4u8; 32]))));
	}

	#[test]
	fn test_record_json_shape() {
		let permit = svm_record().to_signed().unwrap();
		let json = PermitRecord::from_signed(&permit).to_json().unwrap();
		let value: serde_json::Value = serde_json::from_str(&json).unwrap();
		assert!(value["amount"].is_string());
		assert!(value["deadline"].is_i64());
		assert!(value.get("digest").is_none());

		let back = PermitRecord::parse_json(&json).unwrap();
		assert_eq!(back, permit);
	}

	#[test]
	fn test_record_rejects_bad_fields() {
		let mut record = svm_record();
		record.amount = "1.5".to_string();
		assert!(matches!(
			record.to_signed(),
			Err(EncodingError::InvalidInteger { field: "amount", .. })
		));

		let mut record = svm_record();
		record.signer = Some(Pubkey([9u8; 32]).to_string());
		assert!(matches!(
			record.to_signed(),
			Err(EncodingError::SignerMismatch { .. })
		));

		let mut record = svm_record();
		record.verifier = "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string();
		assert!(matches!(
			record.to_signed(),
			Err(EncodingError::FamilyMismatch { field: "verifier", .. })
		));

		let mut record = svm_record();
		record.signature = "0xabcd".to_string();
		assert!(matches!(
			record.to_signed(),
			Err(EncodingError::InvalidSignature(_))
		));
	}

	#[test]
	fn test_record_deadline_must_be_integer() {
		let json = r#"{"owner":"x","verifier":"y","asset":"z","amount":"1","fee":"0",
			"deadline":"soon","nonce":"0","signature":"00"}"#;
		assert!(matches!(
			PermitRecord::parse_json(json),
			Err(EncodingError::InvalidValue { field: "record", .. })
		));
	}
}
