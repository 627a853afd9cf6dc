//! Canonical permit messages and the on-chain call shapes that carry them.
//!
//! A permit is signed over a canonical message that the verification oracle
//! re-derives from the transfer parameters alone. Two encodings exist:
//!
//! - [`StructuredEncoder`]: the ERC-2612 EIP-712 digest used by account-model
//!   chains, where the token contract is the verifying contract.
//! - [`FlatEncoder`]: a fixed 110-byte little-endian layout signed with
//!   ed25519 and checked by the escrow program through the native ed25519
//!   verification instruction.
//!
//! The [`gateway`] and [`program`] modules encode and decode the calls that
//! submit a permit to each oracle.

use alloy_primitives::B256;
use relay_types::{ChainFamily, EncodingError, Identity, PermitParameters, PermitSignature};
use thiserror::Error;

pub mod flat;
pub mod gateway;
pub mod program;
pub mod structured;

pub use flat::FlatEncoder;
pub use structured::{PermitDomain, StructuredEncoder};

/// Errors raised while encoding a permit or verifying its signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
	#[error(transparent)]
	Encoding(#[from] EncodingError),
	/// The signature is well formed but does not verify for the claimed signer.
	#[error("Signature verification failed: {0}")]
	Verification(String),
}

/// The bytes a permit signature covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalMessage {
	/// 32-byte EIP-712 digest, signed as a prehash.
	Digest(B256),
	/// Raw flat message, signed as-is.
	Flat(Vec<u8>),
}

impl CanonicalMessage {
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			CanonicalMessage::Digest(digest) => digest.as_slice(),
			CanonicalMessage::Flat(bytes) => bytes,
		}
	}
}

/// Deterministic encoding of permit parameters plus signature verification
/// over that encoding.
pub trait PermitEncoder: Send + Sync {
	fn family(&self) -> ChainFamily;

	/// Serializes `params` into the message the owner signs.
	///
	/// Fails with [`EncodingError`] for identities of the wrong family or
	/// values that do not fit the encoding's integer widths.
	fn encode(&self, params: &PermitParameters) -> Result<CanonicalMessage, EncodingError>;

	/// Checks that `signature` over the encoding of `params` was produced by
	/// `signer`.
	fn verify(
		&self,
		params: &PermitParameters,
		signature: &PermitSignature,
		signer: &Identity,
	) -> Result<(), MessageError>;
}
