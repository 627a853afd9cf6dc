//! Flat-byte permit messages for the escrow program.
//!
//! Layout, no delimiters or length prefixes:
//!
//! ```text
//! "GASLESS_PERMIT" (14) | owner (32) | program id (32) |
//! amount u64 LE (8) | fee u64 LE (8) | deadline i64 LE (8) | nonce u64 LE (8)
//! ```

use crate::{CanonicalMessage, MessageError, PermitEncoder};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use relay_types::utils::u256_to_u64;
use relay_types::{ChainFamily, EncodingError, Identity, PermitParameters, PermitSignature};

pub const MESSAGE_TAG: &[u8] = b"GASLESS_PERMIT";
pub const MESSAGE_LEN: usize = MESSAGE_TAG.len() + 32 + 32 + 4 * 8;

/// Flat encoder. Stateless: the program id travels in the parameters as the
/// verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatEncoder;

/// Integer fields of a permit narrowed to the program's widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatAmounts {
	pub amount: u64,
	pub fee: u64,
	pub deadline: i64,
	pub nonce: u64,
}

impl FlatEncoder {
	pub fn new() -> Self {
		Self
	}

	/// Narrows amount, fee and nonce to `u64`, and checks `amount + fee`.
	pub fn amounts(params: &PermitParameters) -> Result<FlatAmounts, EncodingError> {
		let amount = u256_to_u64("amount", params.amount)?;
		let fee = u256_to_u64("fee", params.fee)?;
		amount
			.checked_add(fee)
			.ok_or(EncodingError::Overflow("u64"))?;
		Ok(FlatAmounts {
			amount,
			fee,
			deadline: params.deadline,
			nonce: u256_to_u64("nonce", params.nonce)?,
		})
	}

	/// The 110-byte message for `params`.
	pub fn message(params: &PermitParameters) -> Result<Vec<u8>, EncodingError> {
		let owner = params.owner.svm("owner")?;
		let program = params.verifier.svm("verifier")?;
		params.asset.svm("asset")?;
		let a = Self::amounts(params)?;

		let mut msg = Vec::with_capacity(MESSAGE_LEN);
		msg.extend_from_slice(MESSAGE_TAG);
		msg.extend_from_slice(owner.as_bytes());
		msg.extend_from_slice(program.as_bytes());
		msg.extend_from_slice(&a.amount.to_le_bytes());
		msg.extend_from_slice(&a.fee.to_le_bytes());
		msg.extend_from_slice(&a.deadline.to_le_bytes());
		msg.extend_from_slice(&a.nonce.to_le_bytes());
		Ok(msg)
	}
}

impl PermitEncoder for FlatEncoder {
	fn family(&self) -> ChainFamily {
		ChainFamily::Svm
	}

	fn encode(&self, params: &PermitParameters) -> Result<CanonicalMessage, EncodingError> {
		Self::message(params).map(CanonicalMessage::Flat)
	}

	fn verify(
		&self,
		params: &PermitParameters,
		signature: &PermitSignature,
		signer: &Identity,
	) -> Result<(), MessageError> {
		let signer = signer.svm("signer")?;
		let message = Self::message(params)?;
		verify_ed25519(signer.as_bytes(), &signature.ed25519_bytes()?, &message)
	}
}

/// Verifies a raw ed25519 signature.
pub fn verify_ed25519(
	public_key: &[u8; 32],
	signature: &[u8; 64],
	message: &[u8],
) -> Result<(), MessageError> {
	let key = VerifyingKey::from_bytes(public_key)
		.map_err(|e| MessageError::Verification(format!("invalid public key: {}", e)))?;
	key.verify(message, &Signature::from_bytes(signature))
		.map_err(|e| MessageError::Verification(e.to_string()))
}
