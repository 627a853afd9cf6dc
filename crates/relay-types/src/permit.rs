//! Permit parameters and signed permits.
//!
//! A permit is the owner's off-chain authorization of one transfer: `amount`
//! to a receiver and `fee` to whichever relayer lands it, valid until
//! `deadline`, consumable once through `nonce`. Parameters are immutable once
//! signed; every constructor validates that all identities belong to one
//! chain family.

use crate::{ChainFamily, EncodingError, Identity};
use alloy_primitives::{keccak256, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a permit, derived from the fields that make it unique
/// on chain: family, owner, verifier, asset and nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermitId(pub B256);

impl PermitId {
	/// Parses a `0x`-prefixed or bare 32-byte hex id.
	pub fn parse(value: &str) -> Result<Self, EncodingError> {
		let hex_part = crate::without_0x_prefix(value);
		let bytes = hex::decode(hex_part).map_err(|e| EncodingError::InvalidValue {
			field: "permit_id",
			message: e.to_string(),
		})?;
		if bytes.len() != 32 {
			return Err(EncodingError::InvalidValue {
				field: "permit_id",
				message: format!("expected 32 bytes, got {}", bytes.len()),
			});
		}
		Ok(Self(B256::from_slice(&bytes)))
	}
}

impl fmt::Display for PermitId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(self.0))
	}
}

/// The signed content of a permit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitParameters {
	/// Account authorizing the transfer.
	pub owner: Identity,
	/// Oracle deployment that must accept the permit: the gateway contract
	/// acting as ERC-2612 spender, or the escrow program id.
	pub verifier: Identity,
	/// Token contract or mint.
	pub asset: Identity,
	/// Quantity delivered to the receiver, in base units.
	pub amount: U256,
	/// Quantity delivered to the relayer, in base units.
	pub fee: U256,
	/// Absolute expiry in seconds since the epoch.
	pub deadline: i64,
	/// Replay protection value.
	pub nonce: U256,
}

impl PermitParameters {
	/// Builds parameters after checking that every identity shares the owner's
	/// chain family.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		owner: Identity,
		verifier: Identity,
		asset: Identity,
		amount: U256,
		fee: U256,
		deadline: i64,
		nonce: U256,
	) -> Result<Self, EncodingError> {
		let params = Self {
			owner,
			verifier,
			asset,
			amount,
			fee,
			deadline,
			nonce,
		};
		params.validate_family()?;
		Ok(params)
	}

	/// The chain family of the owner, which every other identity must share.
	pub fn family(&self) -> ChainFamily {
		self.owner.family()
	}

	/// Checks that verifier and asset share the owner's family.
	pub fn validate_family(&self) -> Result<ChainFamily, EncodingError> {
		let family = self.family();
		self.verifier.require_family(family, "verifier")?;
		self.asset.require_family(family, "asset")?;
		Ok(family)
	}

	/// `amount + fee`, the quantity debited from the owner.
	pub fn total(&self) -> Result<U256, EncodingError> {
		self.amount
			.checked_add(self.fee)
			.ok_or(EncodingError::Overflow("uint256"))
	}

	/// Deterministic permit id.
	pub fn id(&self) -> PermitId {
		let mut preimage = Vec::with_capacity(1 + 3 * 32 + 32);
		preimage.push(self.family().tag());
		preimage.extend_from_slice(self.owner.as_bytes());
		preimage.extend_from_slice(self.verifier.as_bytes());
		preimage.extend_from_slice(self.asset.as_bytes());
		preimage.extend_from_slice(&self.nonce.to_be_bytes::<32>());
		PermitId(keccak256(preimage))
	}
}

/// Detached signature bytes over the canonical permit message.
#[derive(Clone, PartialEq, Eq)]
pub struct PermitSignature(Vec<u8>);

impl PermitSignature {
	/// Length of an EVM `r || s || v` signature.
	pub const EVM_LEN: usize = 65;
	/// Length of an ed25519 signature.
	pub const SVM_LEN: usize = 64;

	pub fn new(bytes: Vec<u8>) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(&self.0))
	}

	/// Checks the length and, on EVM, the recovery byte.
	pub fn validate_for(&self, family: ChainFamily) -> Result<(), EncodingError> {
		match family {
			ChainFamily::Evm => {
				if self.0.len() != Self::EVM_LEN {
					return Err(EncodingError::InvalidSignature(format!(
						"expected {} bytes for an EVM signature, got {}",
						Self::EVM_LEN,
						self.0.len()
					)));
				}
				let v = self.0[64];
				if !matches!(v, 0 | 1 | 27 | 28) {
					return Err(EncodingError::InvalidSignature(format!(
						"invalid recovery byte {}",
						v
					)));
				}
			},
			ChainFamily::Svm => {
				if self.0.len() != Self::SVM_LEN {
					return Err(EncodingError::InvalidSignature(format!(
						"expected {} bytes for an ed25519 signature, got {}",
						Self::SVM_LEN,
						self.0.len()
					)));
				}
			},
		}
		Ok(())
	}

	/// Splits an EVM signature into `(r, s, v)` with `v` normalized to 27/28.
	pub fn split_rsv(&self) -> Result<(B256, B256, u8), EncodingError> {
		self.validate_for(ChainFamily::Evm)?;
		let r = B256::from_slice(&self.0[..32]);
		let s = B256::from_slice(&self.0[32..64]);
		let v = match self.0[64] {
			0 | 27 => 27,
			_ => 28,
		};
		Ok((r, s, v))
	}

	/// The 64 raw bytes of an ed25519 signature.
	pub fn ed25519_bytes(&self) -> Result<[u8; 64], EncodingError> {
		self.validate_for(ChainFamily::Svm)?;
		let mut out = [0u8; 64];
		out.copy_from_slice(&self.0);
		Ok(out)
	}
}

impl fmt::Debug for PermitSignature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PermitSignature({})", self.to_hex())
	}
}

/// A permit ready to be relayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPermit {
	pub parameters: PermitParameters,
	pub signature: PermitSignature,
	/// Public identity of the signer; always equal to the owner.
	pub signer: Identity,
	/// Destination for `amount`, when the owner pinned one.
	pub receiver: Option<Identity>,
	/// Digest that travelled with the record. Informational only: relayers
	/// re-derive the message from the parameters.
	pub claimed_digest: Option<B256>,
}

impl SignedPermit {
	/// Packages parameters and signature, enforcing `signer == owner` and the
	/// signature shape of the chain family.
	pub fn new(
		parameters: PermitParameters,
		signature: PermitSignature,
		signer: Identity,
	) -> Result<Self, EncodingError> {
		let family = parameters.validate_family()?;
		if signer != parameters.owner {
			return Err(EncodingError::SignerMismatch {
				signer: signer.to_string(),
				owner: parameters.owner.to_string(),
			});
		}
		signature.validate_for(family)?;
		Ok(Self {
			parameters,
			signature,
			signer,
			receiver: None,
			claimed_digest: None,
		})
	}

	/// Pins the receiver carried with the record.
	pub fn with_receiver(mut self, receiver: Identity) -> Result<Self, EncodingError> {
		receiver.require_family(self.parameters.family(), "receiver")?;
		self.receiver = Some(receiver);
		Ok(self)
	}

	pub fn id(&self) -> PermitId {
		self.parameters.id()
	}

	pub fn family(&self) -> ChainFamily {
		self.parameters.family()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Pubkey;
	use alloy_primitives::Address;

	fn evm_params() -> PermitParameters {
		PermitParameters::new(
			Identity::Evm(Address::repeat_byte(1)),
			Identity::Evm(Address::repeat_byte(2)),
			Identity::Evm(Address::repeat_byte(3)),
			U256::from(100u64),
			U256::from(1u64),
			1_700_000_000,
			U256::ZERO,
		)
		.unwrap()
	}

	#[test]
	fn test_mixed_families_rejected() {
		let err = PermitParameters::new(
			Identity::Evm(Address::repeat_byte(1)),
			Identity::Svm(Pubkey([2u8; 32])),
			Identity::Evm(Address::repeat_byte(3)),
			U256::from(1u64),
			U256::ZERO,
			0,
			U256::ZERO,
		)
		.unwrap_err();
		assert!(matches!(
			err,
			EncodingError::FamilyMismatch {
				field: "verifier",
				..
			}
		));
	}

	#[test]
	fn test_total_overflow() {
		let mut params = evm_params();
		params.amount = U256::MAX;
		params.fee = U256::from(1u8);
		assert_eq!(params.total(), Err(EncodingError::Overflow("uint256")));

		params.fee = U256::ZERO;
		assert_eq!(params.total().unwrap(), U256::MAX);
	}

	#[test]
	fn test_id_is_stable_and_nonce_sensitive() {
		let params = evm_params();
		assert_eq!(params.id(), evm_params().id());

		let mut next = evm_params();
		next.nonce = U256::from(1u8);
		assert_ne!(params.id(), next.id());

		let parsed = PermitId::parse(&params.id().to_string()).unwrap();
		assert_eq!(parsed, params.id());
	}

	#[test]
	fn test_signed_permit_requires_owner_signer() {
		let params = evm_params();
		let mut sig = vec![0u8; 65];
		sig[64] = 27;
		let err = SignedPermit::new(
			params.clone(),
			PermitSignature::new(sig.clone()),
			Identity::Evm(Address::repeat_byte(9)),
		)
		.unwrap_err();
		assert!(matches!(err, EncodingError::SignerMismatch { .. }));

		let permit = SignedPermit::new(params.clone(), PermitSignature::new(sig), params.owner)
			.unwrap();
		assert_eq!(permit.id(), params.id());
	}

	#[test]
	fn test_signature_shape() {
		let short = PermitSignature::new(vec![0u8; 64]);
		assert!(short.validate_for(ChainFamily::Evm).is_err());
		assert!(short.validate_for(ChainFamily::Svm).is_ok());

		let mut bytes = vec![0u8; 65];
		bytes[64] = 1;
		let (_, _, v) = PermitSignature::new(bytes.clone()).split_rsv().unwrap();
		assert_eq!(v, 28);
		bytes[64] = 29;
		assert!(PermitSignature::new(bytes).split_rsv().is_err());
	}
}
