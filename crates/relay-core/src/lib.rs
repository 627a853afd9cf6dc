//! Relay execution for signed permits.
//!
//! The executor takes a [`SignedPermit`](relay_types::SignedPermit), runs the
//! local prechecks, builds the chain-specific execution plan, submits it to
//! the verification oracle and waits for confirmation. Every failure is
//! reported as a classified [`RelayError`]. The oracle is the only authority
//! on nonce consumption; the executor never caches nonce state.

use relay_message::MessageError;
use relay_oracle::{OracleError, RejectReason};
use relay_types::{EncodingError, RelayErrorKind};
use thiserror::Error;

pub mod builder;
pub mod executor;

pub use builder::{BuilderError, RelayerBuilder, RelayerFactories};
pub use executor::RelayExecutor;

/// Classified outcome of a failed relay.
///
/// Each variant carries the failing check in its message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
	#[error("Encoding error: {0}")]
	Encoding(String),
	#[error("Permit expired: {0}")]
	ExpiredPermit(String),
	#[error("Nonce already consumed: {0}")]
	NonceAlreadyConsumed(String),
	#[error("Signature rejected: {0}")]
	SignatureRejected(String),
	#[error("Insufficient funds: {0}")]
	InsufficientFunds(String),
	#[error("Transient submission failure: {0}")]
	TransientSubmissionFailure(String),
	/// A structured rejection that matches no known reason, verbatim.
	#[error("Oracle rejected: {0}")]
	OracleRejected(String),
}

impl RelayError {
	pub fn kind(&self) -> RelayErrorKind {
		match self {
			RelayError::Encoding(_) => RelayErrorKind::EncodingError,
			RelayError::ExpiredPermit(_) => RelayErrorKind::ExpiredPermit,
			RelayError::NonceAlreadyConsumed(_) => RelayErrorKind::NonceAlreadyConsumed,
			RelayError::SignatureRejected(_) => RelayErrorKind::SignatureRejected,
			RelayError::InsufficientFunds(_) => RelayErrorKind::InsufficientFunds,
			RelayError::TransientSubmissionFailure(_) => {
				RelayErrorKind::TransientSubmissionFailure
			},
			RelayError::OracleRejected(_) => RelayErrorKind::OracleRejected,
		}
	}

	/// Only transient failures may succeed when retried.
	pub fn is_retryable(&self) -> bool {
		matches!(self, RelayError::TransientSubmissionFailure(_))
	}
}

impl From<EncodingError> for RelayError {
	fn from(err: EncodingError) -> Self {
		RelayError::Encoding(err.to_string())
	}
}

impl From<MessageError> for RelayError {
	fn from(err: MessageError) -> Self {
		match err {
			MessageError::Encoding(e) => e.into(),
			MessageError::Verification(message) => RelayError::SignatureRejected(message),
		}
	}
}

impl From<OracleError> for RelayError {
	fn from(err: OracleError) -> Self {
		match err {
			OracleError::Network(_) | OracleError::Timeout(_) => {
				RelayError::TransientSubmissionFailure(err.to_string())
			},
			OracleError::Rejected { reason, message } => match reason {
				RejectReason::Expired => RelayError::ExpiredPermit(message),
				RejectReason::NonceConsumed => RelayError::NonceAlreadyConsumed(message),
				RejectReason::InvalidSignature => RelayError::SignatureRejected(message),
				RejectReason::InsufficientFunds => RelayError::InsufficientFunds(message),
				RejectReason::Reverted | RejectReason::Other => RelayError::OracleRejected(message),
			},
			OracleError::Encoding(e) => e.into(),
			OracleError::NotFound(_) | OracleError::Configuration(_) => {
				RelayError::OracleRejected(err.to_string())
			},
		}
	}
}
