//! Verification oracle clients.
//!
//! The oracle is the on-chain contract (EVM gateway) or program (SVM escrow)
//! that verifies a permit, consumes its nonce and moves funds atomically. This
//! crate talks to it: nonce and balance reads, plan submission and
//! confirmation tracking. Rejections are classified into [`RejectReason`]s so
//! the executor can report them without knowing chain error formats.

use alloy_primitives::U256;
use async_trait::async_trait;
use relay_message::{PermitDomain, PermitEncoder};
use relay_types::{
	ChainFamily, EncodingError, ExecutionPlan, Identity, ImplementationRegistry, SecretString,
	SettlementReference, TransactionReceipt,
};
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod svm {
		pub mod rpc;
		pub mod transaction;
	}
	pub mod memory;
}

/// Why the oracle refused a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
	Expired,
	NonceConsumed,
	InvalidSignature,
	InsufficientFunds,
	/// Mined but failed without a decodable reason.
	Reverted,
	/// A structured rejection that matches no known reason.
	Other,
}

/// Errors that can occur while talking to the oracle.
#[derive(Debug, Error)]
pub enum OracleError {
	/// Transport or node failure; nothing was applied.
	#[error("Network error: {0}")]
	Network(String),
	#[error("Timed out: {0}")]
	Timeout(String),
	#[error("Rejected by oracle: {message}")]
	Rejected {
		reason: RejectReason,
		message: String,
	},
	#[error("Not found: {0}")]
	NotFound(String),
	#[error(transparent)]
	Encoding(#[from] EncodingError),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl OracleError {
	pub fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
		OracleError::Rejected {
			reason,
			message: message.into(),
		}
	}

	/// Whether the same request may succeed if sent again.
	pub fn is_transient(&self) -> bool {
		matches!(self, OracleError::Network(_) | OracleError::Timeout(_))
	}
}

/// Client of one verification oracle deployment.
#[async_trait]
pub trait OracleInterface: Send + Sync {
	fn family(&self) -> ChainFamily;

	/// Identity permits must name as their verifier.
	fn verifier(&self) -> Identity;

	/// Identity that pays network fees and collects relay fees.
	fn relayer(&self) -> Identity;

	/// EVM chain id; `None` for SVM.
	fn chain_id(&self) -> Option<u64>;

	/// Encoder reproducing the message the oracle verifies for `asset`.
	async fn encoder(&self, asset: &Identity) -> Result<Box<dyn PermitEncoder>, OracleError>;

	/// EIP-712 domain signers must use for `asset`; `None` for SVM.
	async fn permit_domain(&self, asset: &Identity) -> Result<Option<PermitDomain>, OracleError>;

	/// EVM: the token's `nonces(owner)`. SVM: the next fresh nonce.
	async fn current_nonce(&self, owner: &Identity, asset: &Identity) -> Result<U256, OracleError>;

	async fn is_nonce_consumed(
		&self,
		owner: &Identity,
		asset: &Identity,
		nonce: U256,
	) -> Result<bool, OracleError>;

	/// Sends the plan. Returns once the oracle has accepted it for inclusion.
	async fn submit(&self, plan: &ExecutionPlan) -> Result<SettlementReference, OracleError>;

	/// Resolves once the settlement has `confirmations` confirmations.
	///
	/// Polls until then; callers bound the wait with a timeout.
	async fn wait_for_confirmation(
		&self,
		reference: &SettlementReference,
		confirmations: u64,
	) -> Result<TransactionReceipt, OracleError>;

	/// Token balance of `holder`. On SVM this includes the holder's escrow.
	async fn balance(&self, holder: &Identity, asset: &Identity) -> Result<U256, OracleError>;
}

pub type OracleFactory = fn(&toml::Value) -> Result<Box<dyn OracleInterface>, OracleError>;

pub trait OracleRegistry: ImplementationRegistry<Factory = OracleFactory> {}

/// All oracle clients, by configuration name.
pub fn get_all_implementations() -> Vec<(&'static str, OracleFactory)> {
	use implementations::{evm, memory, svm};

	vec![
		(evm::alloy::Registry::NAME, evm::alloy::Registry::factory()),
		(svm::rpc::Registry::NAME, svm::rpc::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

pub(crate) fn config_str<'a>(config: &'a toml::Value, key: &str) -> Result<&'a str, OracleError> {
	config
		.get(key)
		.and_then(|v| v.as_str())
		.ok_or_else(|| OracleError::Configuration(format!("{} is required", key)))
}

pub(crate) fn config_u64(
	config: &toml::Value,
	key: &str,
	default: u64,
) -> Result<u64, OracleError> {
	match config.get(key) {
		None => Ok(default),
		Some(value) => value
			.as_integer()
			.and_then(|v| u64::try_from(v).ok())
			.ok_or_else(|| {
				OracleError::Configuration(format!("{} must be a non-negative integer", key))
			}),
	}
}

pub(crate) fn config_identity(
	config: &toml::Value,
	key: &'static str,
	family: ChainFamily,
) -> Result<Identity, OracleError> {
	Identity::parse_as(family, key, config_str(config, key)?)
		.map_err(|e| OracleError::Configuration(e.to_string()))
}

pub(crate) fn config_secret(config: &toml::Value, key: &str) -> Result<SecretString, OracleError> {
	config_str(config, key).map(SecretString::from)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transient_classification() {
		assert!(OracleError::Network("reset".into()).is_transient());
		assert!(OracleError::Timeout("slow".into()).is_transient());
		assert!(!OracleError::rejected(RejectReason::Expired, "late").is_transient());
		assert!(!OracleError::Configuration("bad".into()).is_transient());
	}

	#[test]
	fn test_config_helpers() {
		let config: toml::Value = toml::from_str(
			r#"
			verifier = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
			confirmations = 3
			negative = -1
			"#,
		)
		.unwrap();

		assert!(config_identity(&config, "verifier", ChainFamily::Evm).is_ok());
		assert!(config_identity(&config, "verifier", ChainFamily::Svm).is_err());
		assert_eq!(config_u64(&config, "confirmations", 1).unwrap(), 3);
		assert_eq!(config_u64(&config, "missing", 7).unwrap(), 7);
		assert!(config_u64(&config, "negative", 0).is_err());
		assert!(matches!(
			config_str(&config, "rpc_url"),
			Err(OracleError::Configuration(_))
		));
	}

	#[test]
	fn test_every_implementation_registered() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert_eq!(names, vec!["evm_alloy", "svm_rpc", "memory"]);
	}
}
