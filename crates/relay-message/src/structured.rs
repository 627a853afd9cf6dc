//! ERC-2612 permit digests.
//!
//! The signed value is the EIP-712 digest of
//! `Permit(owner, spender = verifier, value = amount + fee, nonce, deadline)`
//! under the token's versioned domain. The receiver is not part of the
//! message; the gateway learns it from the call arguments.

use crate::{CanonicalMessage, MessageError, PermitEncoder};
use alloy_primitives::{keccak256, PrimitiveSignature, B256, U256};
use relay_types::utils::{
	compute_domain_hash, compute_final_digest, Eip712AbiEncoder, DEFAULT_DOMAIN_VERSION,
	PERMIT_TYPE,
};
use relay_types::{ChainFamily, EncodingError, Identity, PermitParameters, PermitSignature};

/// Token-specific EIP-712 domain fields. The verifying contract is always the
/// permit's asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermitDomain {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
}

impl PermitDomain {
	pub fn new(name: impl Into<String>, version: Option<String>, chain_id: u64) -> Self {
		Self {
			name: name.into(),
			version: version.unwrap_or_else(|| DEFAULT_DOMAIN_VERSION.to_string()),
			chain_id,
		}
	}
}

/// EIP-712 encoder bound to one token domain.
#[derive(Debug, Clone)]
pub struct StructuredEncoder {
	domain: PermitDomain,
}

impl StructuredEncoder {
	pub fn new(domain: PermitDomain) -> Self {
		Self { domain }
	}

	pub fn domain(&self) -> &PermitDomain {
		&self.domain
	}

	/// The EIP-712 digest for `params`.
	pub fn digest(&self, params: &PermitParameters) -> Result<B256, EncodingError> {
		let owner = params.owner.evm("owner")?;
		let spender = params.verifier.evm("verifier")?;
		let token = params.asset.evm("asset")?;
		if params.deadline < 0 {
			return Err(EncodingError::OutOfRange {
				field: "deadline",
				width: "uint256",
				value: params.deadline.to_string(),
			});
		}
		let value = params.total()?;

		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&keccak256(PERMIT_TYPE.as_bytes()));
		enc.push_address(&owner);
		enc.push_address(&spender);
		enc.push_u256(value);
		enc.push_u256(params.nonce);
		enc.push_u256(U256::from(params.deadline as u64));
		let struct_hash = keccak256(enc.finish());

		let domain_hash = compute_domain_hash(
			&self.domain.name,
			&self.domain.version,
			self.domain.chain_id,
			&token,
		);
		Ok(compute_final_digest(&domain_hash, &struct_hash))
	}
}

impl PermitEncoder for StructuredEncoder {
	fn family(&self) -> ChainFamily {
		ChainFamily::Evm
	}

	fn encode(&self, params: &PermitParameters) -> Result<CanonicalMessage, EncodingError> {
		self.digest(params).map(CanonicalMessage::Digest)
	}

	fn verify(
		&self,
		params: &PermitParameters,
		signature: &PermitSignature,
		signer: &Identity,
	) -> Result<(), MessageError> {
		let expected = signer.evm("signer")?;
		let digest = self.digest(params)?;
		let (r, s, v) = signature.split_rsv()?;
		let sig = PrimitiveSignature::new(
			U256::from_be_bytes(r.0),
			U256::from_be_bytes(s.0),
			v == 28,
		);
		let recovered = sig
			.recover_address_from_prehash(&digest)
			.map_err(|e| MessageError::Verification(format!("recovery failed: {}", e)))?;
		if recovered != expected {
			return Err(MessageError::Verification(format!(
				"recovered {} but expected {}",
				recovered, expected
			)));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::Address;
	use alloy_signer::SignerSync;
	use alloy_signer_local::PrivateKeySigner;
	use alloy_sol_types::{eip712_domain, sol, SolStruct};

	sol! {
		struct Permit {
			address owner;
			address spender;
			uint256 value;
			uint256 nonce;
			uint256 deadline;
		}
	}

	// Well-known development key.
	const OWNER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn encoder() -> StructuredEncoder {
		StructuredEncoder::new(PermitDomain::new("PayPal USD", None, 31337))
	}

	fn params(owner: Address) -> PermitParameters {
		PermitParameters::new(
			Identity::Evm(owner),
			Identity::Evm(Address::repeat_byte(0x22)),
			Identity::Evm(Address::repeat_byte(0x33)),
			U256::from(10_000_000_000_000_000_000u128),
			U256::from(100_000_000_000_000_000u128),
			1_900_000_000,
			U256::from(3u8),
		)
		.unwrap()
	}

	fn sign(signer: &PrivateKeySigner, digest: &B256) -> PermitSignature {
		let sig = signer.sign_hash_sync(digest).unwrap();
		PermitSignature::new(sig.as_bytes().to_vec())
	}

	#[test]
	fn test_digest_matches_sol_types() {
		let owner = Address::repeat_byte(0x11);
		let p = params(owner);
		let domain = eip712_domain! {
			name: "PayPal USD",
			version: "1",
			chain_id: 31337,
			verifying_contract: Address::repeat_byte(0x33),
		};
		let permit = Permit {
			owner,
			spender: Address::repeat_byte(0x22),
			value: p.amount + p.fee,
			nonce: p.nonce,
			deadline: U256::from(1_900_000_000u64),
		};
		assert_eq!(
			encoder().digest(&p).unwrap(),
			permit.eip712_signing_hash(&domain)
		);
	}

	#[test]
	fn test_digest_is_deterministic() {
		let p = params(Address::repeat_byte(0x11));
		assert_eq!(encoder().encode(&p).unwrap(), encoder().encode(&p).unwrap());
	}

	#[test]
	fn test_sign_and_verify() {
		let signer: PrivateKeySigner = OWNER_KEY.parse().unwrap();
		let p = params(signer.address());
		let sig = sign(&signer, &encoder().digest(&p).unwrap());
		encoder().verify(&p, &sig, &p.owner).unwrap();
	}

	#[test]
	fn test_tampering_any_field_breaks_verification() {
		let signer: PrivateKeySigner = OWNER_KEY.parse().unwrap();
		let p = params(signer.address());
		let sig = sign(&signer, &encoder().digest(&p).unwrap());

		let mut variants = Vec::new();
		let mut t = p.clone();
		t.amount += U256::from(1u8);
		variants.push(t);
		let mut t = p.clone();
		t.fee += U256::from(1u8);
		variants.push(t);
		let mut t = p.clone();
		t.deadline += 1;
		variants.push(t);
		let mut t = p.clone();
		t.nonce += U256::from(1u8);
		variants.push(t);
		let mut t = p.clone();
		t.verifier = Identity::Evm(Address::repeat_byte(0x44));
		variants.push(t);
		let mut t = p.clone();
		t.asset = Identity::Evm(Address::repeat_byte(0x55));
		variants.push(t);

		for tampered in variants {
			assert!(
				matches!(
					encoder().verify(&tampered, &sig, &p.owner),
					Err(MessageError::Verification(_))
				),
				"tampered permit verified: {:?}",
				tampered
			);
		}

		let other_chain = StructuredEncoder::new(PermitDomain::new("PayPal USD", None, 1));
		assert!(other_chain.verify(&p, &sig, &p.owner).is_err());
	}

	#[test]
	fn test_encoding_errors() {
		let mut p = params(Address::repeat_byte(0x11));
		p.deadline = -1;
		assert!(matches!(
			encoder().digest(&p),
			Err(EncodingError::OutOfRange { field: "deadline", .. })
		));

		let mut p = params(Address::repeat_byte(0x11));
		p.amount = U256::MAX;
		assert_eq!(encoder().digest(&p), Err(EncodingError::Overflow("uint256")));
	}
}
