//! Chain families and account identities.
//!
//! An identity is the public handle of an account on one of the two supported
//! execution environments. EVM identities are 20-byte addresses written as
//! `0x`-prefixed hex, SVM identities are 32-byte ed25519 public keys written
//! in base58. Encoders consume the raw bytes.

use crate::EncodingError;
use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The execution environment a permit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
	/// Account model: contract calls, EIP-712 structured permits.
	Evm,
	/// PDA model: program instructions over escrow accounts, flat-byte permits.
	Svm,
}

impl ChainFamily {
	/// Returns the lowercase name used in configuration and logs.
	pub fn as_str(&self) -> &'static str {
		match self {
			ChainFamily::Evm => "evm",
			ChainFamily::Svm => "svm",
		}
	}

	/// Single-byte tag used when hashing identities of different families.
	pub fn tag(&self) -> u8 {
		match self {
			ChainFamily::Evm => 0,
			ChainFamily::Svm => 1,
		}
	}
}

impl fmt::Display for ChainFamily {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ChainFamily {
	type Err = EncodingError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"evm" => Ok(ChainFamily::Evm),
			"svm" | "solana" => Ok(ChainFamily::Svm),
			other => Err(EncodingError::InvalidValue {
				field: "family",
				message: format!("unknown chain family '{}'", other),
			}),
		}
	}
}

/// A 32-byte ed25519 public key, displayed in base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
	pub const fn new_from_array(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}

	pub fn to_bytes(self) -> [u8; 32] {
		self.0
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.0
	}

	/// Decodes a base58 public key.
	pub fn from_base58(s: &str) -> Result<Self, String> {
		let decoded = bs58::decode(s)
			.into_vec()
			.map_err(|e| format!("invalid base58: {}", e))?;
		let bytes: [u8; 32] = decoded
			.as_slice()
			.try_into()
			.map_err(|_| format!("expected 32 bytes, got {}", decoded.len()))?;
		Ok(Self(bytes))
	}

	pub fn to_base58(&self) -> String {
		bs58::encode(self.0).into_string()
	}
}

impl fmt::Display for Pubkey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base58())
	}
}

impl fmt::Debug for Pubkey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Pubkey({})", self.to_base58())
	}
}

impl FromStr for Pubkey {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_base58(s)
	}
}

impl From<[u8; 32]> for Pubkey {
	fn from(bytes: [u8; 32]) -> Self {
		Self(bytes)
	}
}

impl Serialize for Pubkey {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base58())
	}
}

impl<'de> Deserialize<'de> for Pubkey {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Pubkey::from_base58(&s).map_err(serde::de::Error::custom)
	}
}

/// A chain-family-tagged account identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
	Evm(Address),
	Svm(Pubkey),
}

impl Identity {
	/// The chain family this identity belongs to.
	pub fn family(&self) -> ChainFamily {
		match self {
			Identity::Evm(_) => ChainFamily::Evm,
			Identity::Svm(_) => ChainFamily::Svm,
		}
	}

	/// Raw identity bytes: 20 for EVM, 32 for SVM.
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Identity::Evm(address) => address.as_slice(),
			Identity::Svm(pubkey) => pubkey.as_bytes(),
		}
	}

	/// Parses an identity string, attributing failures to `field`.
	///
	/// Strings starting with `0x` are EVM addresses, anything else is read as
	/// a base58 public key.
	pub fn parse(field: &'static str, value: &str) -> Result<Self, EncodingError> {
		let trimmed = value.trim();
		if trimmed.is_empty() {
			return Err(EncodingError::MissingField(field));
		}
		if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
			let hex_part = &trimmed[2..];
			if hex_part.len() != 40 {
				return Err(EncodingError::InvalidIdentity {
					field,
					message: format!("EVM address must be 20 bytes, got '{}'", trimmed),
				});
			}
			let bytes = hex::decode(hex_part).map_err(|e| EncodingError::InvalidIdentity {
				field,
				message: format!("invalid hex: {}", e),
			})?;
			return Ok(Identity::Evm(Address::from_slice(&bytes)));
		}
		Pubkey::from_base58(trimmed)
			.map(Identity::Svm)
			.map_err(|message| EncodingError::InvalidIdentity { field, message })
	}

	/// Parses an identity and requires it to belong to `family`.
	pub fn parse_as(
		family: ChainFamily,
		field: &'static str,
		value: &str,
	) -> Result<Self, EncodingError> {
		let identity = Self::parse(field, value)?;
		identity.require_family(family, field)?;
		Ok(identity)
	}

	/// Fails with `FamilyMismatch` unless this identity belongs to `expected`.
	pub fn require_family(
		&self,
		expected: ChainFamily,
		field: &'static str,
	) -> Result<(), EncodingError> {
		let actual = self.family();
		if actual != expected {
			return Err(EncodingError::FamilyMismatch {
				field,
				expected,
				actual,
			});
		}
		Ok(())
	}

	/// Returns the EVM address or a `FamilyMismatch` naming `field`.
	pub fn evm(&self, field: &'static str) -> Result<Address, EncodingError> {
		match self {
			Identity::Evm(address) => Ok(*address),
			Identity::Svm(_) => Err(EncodingError::FamilyMismatch {
				field,
				expected: ChainFamily::Evm,
				actual: ChainFamily::Svm,
			}),
		}
	}

	/// Returns the SVM public key or a `FamilyMismatch` naming `field`.
	pub fn svm(&self, field: &'static str) -> Result<Pubkey, EncodingError> {
		match self {
			Identity::Svm(pubkey) => Ok(*pubkey),
			Identity::Evm(_) => Err(EncodingError::FamilyMismatch {
				field,
				expected: ChainFamily::Svm,
				actual: ChainFamily::Evm,
			}),
		}
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Identity::Evm(address) => write!(f, "{}", address.to_checksum(None)),
			Identity::Svm(pubkey) => write!(f, "{}", pubkey),
		}
	}
}

impl FromStr for Identity {
	type Err = EncodingError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse("identity", s)
	}
}

impl From<Address> for Identity {
	fn from(address: Address) -> Self {
		Identity::Evm(address)
	}
}

impl From<Pubkey> for Identity {
	fn from(pubkey: Pubkey) -> Self {
		Identity::Svm(pubkey)
	}
}

impl Serialize for Identity {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_string())
	}
}

impl<'de> Deserialize<'de> for Identity {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Identity::parse("identity", &s).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_evm_identity() {
		let id = Identity::parse("owner", "0x5fbdb2315678afecb367f032d93f642f64180aa3").unwrap();
		assert_eq!(id.family(), ChainFamily::Evm);
		assert_eq!(id.as_bytes().len(), 20);
		assert_eq!(
			id.to_string().to_lowercase(),
			"0x5fbdb2315678afecb367f032d93f642f64180aa3"
		);
	}

	#[test]
	fn test_parse_svm_identity() {
		let id = Identity::parse("owner", "11111111111111111111111111111111").unwrap();
		assert_eq!(id, Identity::Svm(Pubkey([0u8; 32])));
		assert_eq!(id.to_string(), "11111111111111111111111111111111");

		let token_program =
			Identity::parse("program", "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA").unwrap();
		assert_eq!(token_program.family(), ChainFamily::Svm);
		assert_eq!(token_program.as_bytes().len(), 32);
	}

	#[test]
	fn test_parse_rejects_malformed() {
		assert!(matches!(
			Identity::parse("owner", "0x1234"),
			Err(EncodingError::InvalidIdentity { field: "owner", .. })
		));
		assert!(matches!(
			Identity::parse("owner", "not-base58-0OIl"),
			Err(EncodingError::InvalidIdentity { .. })
		));
		assert!(matches!(
			Identity::parse("owner", ""),
			Err(EncodingError::MissingField("owner"))
		));
	}

	#[test]
	fn test_family_mismatch() {
		let err = Identity::parse_as(
			ChainFamily::Svm,
			"verifier",
			"0x5fbdb2315678afecb367f032d93f642f64180aa3",
		)
		.unwrap_err();
		assert_eq!(
			err,
			EncodingError::FamilyMismatch {
				field: "verifier",
				expected: ChainFamily::Svm,
				actual: ChainFamily::Evm,
			}
		);
	}

	#[test]
	fn test_identity_serde_as_string() {
		let id = Identity::Svm(Pubkey([7u8; 32]));
		let json = serde_json::to_string(&id).unwrap();
		let back: Identity = serde_json::from_str(&json).unwrap();
		assert_eq!(back, id);
	}
}
