//! ed25519 signer for flat permits.

use crate::{ensure_owner, PermitSigner, SignerError};
use ed25519_dalek::{Signer, SigningKey};
use relay_message::FlatEncoder;
use relay_types::{
	ChainFamily, Identity, PermitParameters, PermitSignature, Pubkey, SecretString, SignedPermit,
};
use zeroize::Zeroizing;

/// Loads an ed25519 key from any of the usual encodings:
///
/// - a JSON byte array as written by `solana-keygen` (64 bytes),
/// - base58 of the 64-byte keypair,
/// - hex of the 32-byte secret or the 64-byte keypair.
///
/// For 64-byte keypairs the trailing public key must match the secret.
pub fn load_ed25519_key(key: &SecretString) -> Result<SigningKey, SignerError> {
	let bytes = key.with_exposed(decode_key_bytes)?;
	let secret: [u8; 32] = bytes
		.get(..32)
		.and_then(|s| s.try_into().ok())
		.ok_or_else(|| SignerError::InvalidKey("ed25519 key too short".to_string()))?;
	let signing_key = SigningKey::from_bytes(&secret);

	match bytes.len() {
		32 => Ok(signing_key),
		64 => {
			if signing_key.verifying_key().as_bytes() != &bytes[32..] {
				return Err(SignerError::InvalidKey(
					"keypair public half does not match secret".to_string(),
				));
			}
			Ok(signing_key)
		},
		n => Err(SignerError::InvalidKey(format!(
			"expected 32 or 64 key bytes, got {}",
			n
		))),
	}
}

fn decode_key_bytes(raw: &str) -> Result<Zeroizing<Vec<u8>>, SignerError> {
	let raw = raw.trim();
	if raw.starts_with('[') {
		return serde_json::from_str::<Vec<u8>>(raw)
			.map(Zeroizing::new)
			.map_err(|e| SignerError::InvalidKey(format!("invalid keypair array: {}", e)));
	}
	let hex_part = raw.strip_prefix("0x").unwrap_or(raw);
	if hex_part.len() % 2 == 0 && hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
		if let Ok(bytes) = alloy_primitives::hex::decode(hex_part) {
			return Ok(Zeroizing::new(bytes));
		}
	}
	bs58::decode(raw)
		.into_vec()
		.map(Zeroizing::new)
		.map_err(|e| SignerError::InvalidKey(format!("invalid base58 key: {}", e)))
}

/// Signs the flat permit message.
pub struct Ed25519PermitSigner {
	key: SigningKey,
}

impl Ed25519PermitSigner {
	pub fn new(key: SigningKey) -> Self {
		Self { key }
	}

	pub fn from_secret(key: &SecretString) -> Result<Self, SignerError> {
		load_ed25519_key(key).map(Self::new)
	}

	pub fn pubkey(&self) -> Pubkey {
		Pubkey(self.key.verifying_key().to_bytes())
	}
}

impl PermitSigner for Ed25519PermitSigner {
	fn family(&self) -> ChainFamily {
		ChainFamily::Svm
	}

	fn identity(&self) -> Identity {
		Identity::Svm(self.pubkey())
	}

	fn sign(&self, parameters: PermitParameters) -> Result<SignedPermit, SignerError> {
		let identity = self.identity();
		ensure_owner(&parameters.owner, &identity)?;
		let message = FlatEncoder::message(&parameters)?;
		let signature = self.key.sign(&message);
		Ok(SignedPermit::new(
			parameters,
			PermitSignature::new(signature.to_bytes().to_vec()),
			identity,
		)?)
	}
}
