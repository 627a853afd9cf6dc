//! secp256k1 signer for ERC-2612 permits.

use crate::{ensure_owner, PermitSigner, SignerError};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use relay_message::{PermitDomain, StructuredEncoder};
use relay_types::{
	ChainFamily, Identity, PermitParameters, PermitSignature, SecretString, SignedPermit,
};

/// Parses a hex private key (with or without `0x`).
pub fn load_evm_key(key: &SecretString) -> Result<PrivateKeySigner, SignerError> {
	key.with_exposed(|s| s.trim().trim_start_matches("0x").parse::<PrivateKeySigner>())
		.map_err(|e| SignerError::InvalidKey(format!("invalid secp256k1 key: {}", e)))
}

/// Signs the EIP-712 permit digest for one token domain.
pub struct Eip712PermitSigner {
	signer: PrivateKeySigner,
	encoder: StructuredEncoder,
}

impl Eip712PermitSigner {
	pub fn new(signer: PrivateKeySigner, domain: PermitDomain) -> Self {
		Self {
			signer,
			encoder: StructuredEncoder::new(domain),
		}
	}

	pub fn from_secret(key: &SecretString, domain: PermitDomain) -> Result<Self, SignerError> {
		Ok(Self::new(load_evm_key(key)?, domain))
	}
}

impl PermitSigner for Eip712PermitSigner {
	fn family(&self) -> ChainFamily {
		ChainFamily::Evm
	}

	fn identity(&self) -> Identity {
		Identity::Evm(self.signer.address())
	}

	fn sign(&self, parameters: PermitParameters) -> Result<SignedPermit, SignerError> {
		let identity = self.identity();
		ensure_owner(&parameters.owner, &identity)?;
		let digest = self.encoder.digest(&parameters)?;
		let signature = self
			.signer
			.sign_hash_sync(&digest)
			.map_err(|e| SignerError::SigningFailed(e.to_string()))?;
		// r || s || v with v in {27, 28}
		let bytes = signature.as_bytes().to_vec();
		let mut permit = SignedPermit::new(parameters, PermitSignature::new(bytes), identity)?;
		permit.claimed_digest = Some(digest);
		Ok(permit)
	}
}
