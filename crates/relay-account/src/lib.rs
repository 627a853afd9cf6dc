//! Key management and permit signing.
//!
//! A permit signer holds the owner's key material and turns permit parameters
//! into a [`SignedPermit`]. Signing is pure: the caller fetches the nonce
//! beforehand and no network access happens here. The same module loads the
//! relayer's own keys for the oracle clients.

use relay_message::{MessageError, PermitDomain};
use relay_types::{
	ChainFamily, EncodingError, Identity, PermitParameters, SecretString, SignedPermit,
};
use thiserror::Error;

pub mod implementations {
	pub mod ed25519;
	pub mod eip712;
}

pub use implementations::ed25519::{load_ed25519_key, Ed25519PermitSigner};
pub use implementations::eip712::{load_evm_key, Eip712PermitSigner};

/// Errors that can occur while loading keys or signing permits.
#[derive(Debug, Error)]
pub enum SignerError {
	/// The permit owner is not the identity of the signing key.
	#[error("Permit owner {owner} does not match signing key {signer}")]
	OwnerMismatch { owner: String, signer: String },
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error(transparent)]
	Encoding(#[from] EncodingError),
}

impl From<MessageError> for SignerError {
	fn from(err: MessageError) -> Self {
		match err {
			MessageError::Encoding(e) => SignerError::Encoding(e),
			MessageError::Verification(e) => SignerError::SigningFailed(e),
		}
	}
}

/// Produces detached signatures over canonical permit messages.
pub trait PermitSigner: Send + Sync {
	fn family(&self) -> ChainFamily;

	/// Public identity of the key.
	fn identity(&self) -> Identity;

	/// Signs `parameters` and packages the result.
	///
	/// Refuses with [`SignerError::OwnerMismatch`] when `parameters.owner` is
	/// not this signer's identity.
	fn sign(&self, parameters: PermitParameters) -> Result<SignedPermit, SignerError>;
}

/// Fails unless `owner` is the signer's identity.
pub(crate) fn ensure_owner(owner: &Identity, signer: &Identity) -> Result<(), SignerError> {
	if owner != signer {
		return Err(SignerError::OwnerMismatch {
			owner: owner.to_string(),
			signer: signer.to_string(),
		});
	}
	Ok(())
}

/// Builds the signer for `family` from secret key material.
///
/// EVM signers need the token's EIP-712 domain; it is ignored for SVM.
pub fn signer_for(
	family: ChainFamily,
	key: &SecretString,
	domain: Option<PermitDomain>,
) -> Result<Box<dyn PermitSigner>, SignerError> {
	match family {
		ChainFamily::Evm => {
			let domain = domain.ok_or_else(|| {
				SignerError::InvalidKey("EIP-712 signing requires a token domain".to_string())
			})?;
			Ok(Box::new(Eip712PermitSigner::from_secret(key, domain)?))
		},
		ChainFamily::Svm => Ok(Box::new(Ed25519PermitSigner::from_secret(key)?)),
	}
}
