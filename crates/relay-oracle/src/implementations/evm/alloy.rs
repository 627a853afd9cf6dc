//! Gateway contract client built on Alloy.
//!
//! Reads nonces, balances and EIP-712 domains from the token, simulates every
//! `send` call before broadcasting it, and decodes reverts into
//! [`RejectReason`]s.

use crate::{
	config_identity, config_secret, config_str, config_u64, OracleError, OracleFactory,
	OracleInterface, OracleRegistry, RejectReason,
};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall, SolError};
use alloy_transport::TransportError;
use alloy_transport_http::Http;
use async_trait::async_trait;
use relay_account::load_evm_key;
use relay_message::{
	gateway::{balanceOfCall, nameCall, noncesCall, versionCall},
	PermitDomain, PermitEncoder, StructuredEncoder,
};
use relay_types::{
	with_0x_prefix, without_0x_prefix, ChainFamily, ExecutionPlan, Identity,
	ImplementationRegistry, SettlementReference, TransactionReceipt,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

sol! {
	error ERC2612ExpiredSignature(uint256 deadline);
	error ERC2612InvalidSigner(address signer, address owner);
	error InvalidAccountNonce(address account, uint256 currentNonce);
	error ERC20InsufficientBalance(address sender, uint256 balance, uint256 needed);
}

/// Maps a revert to a rejection reason, by custom error selector first and by
/// the revert string second.
pub fn classify_revert(message: &str, data: Option<&str>) -> OracleError {
	let selector = data
		.and_then(|d| alloy_primitives::hex::decode(without_0x_prefix(d)).ok())
		.and_then(|bytes| bytes.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()));

	let reason = match selector {
		Some(s) if s == ERC2612ExpiredSignature::SELECTOR => RejectReason::Expired,
		Some(s) if s == ERC2612InvalidSigner::SELECTOR => RejectReason::InvalidSignature,
		Some(s) if s == InvalidAccountNonce::SELECTOR => RejectReason::NonceConsumed,
		Some(s) if s == ERC20InsufficientBalance::SELECTOR => RejectReason::InsufficientFunds,
		_ => {
			let lower = message.to_lowercase();
			if lower.contains("expired") {
				RejectReason::Expired
			} else if lower.contains("invalid signature") || lower.contains("invalidsigner") {
				RejectReason::InvalidSignature
			} else if lower.contains("nonce") {
				RejectReason::NonceConsumed
			} else if lower.contains("exceeds balance") || lower.contains("insufficientbalance") {
				RejectReason::InsufficientFunds
			} else {
				RejectReason::Other
			}
		},
	};

	let message = match data {
		Some(d) if !message.contains(d) => format!("{} (data: {})", message, d),
		_ => message.to_string(),
	};
	OracleError::rejected(reason, message)
}

fn classify_call_error(context: &str, error: TransportError) -> OracleError {
	match error.as_error_resp() {
		Some(payload) => {
			let data = payload
				.data
				.as_ref()
				.map(|raw| raw.get().trim_matches('"').to_string());
			if data.is_some() || payload.message.contains("revert") {
				return classify_revert(&payload.message, data.as_deref());
			}
			OracleError::Network(format!("{}: {}", context, payload.message))
		},
		None => OracleError::Network(format!("{}: {}", context, error)),
	}
}

pub struct AlloyOracle {
	provider: Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>,
	chain_id: u64,
	gateway: Address,
	relayer: Address,
	poll_interval: Duration,
	configured_domains: HashMap<Address, PermitDomain>,
	discovered_domains: RwLock<HashMap<Address, PermitDomain>>,
}

impl AlloyOracle {
	pub fn new(
		rpc_url: &str,
		chain_id: u64,
		gateway: Address,
		signer: PrivateKeySigner,
		poll_interval: Duration,
	) -> Result<Self, OracleError> {
		let url = rpc_url
			.parse()
			.map_err(|e| OracleError::Configuration(format!("Invalid RPC URL: {}", e)))?;
		let relayer = signer.address();
		let wallet = EthereumWallet::from(signer.with_chain_id(Some(chain_id)));
		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);
		provider.client().set_poll_interval(poll_interval);

		Ok(Self {
			provider: Arc::new(provider),
			chain_id,
			gateway,
			relayer,
			poll_interval,
			configured_domains: HashMap::new(),
			discovered_domains: RwLock::new(HashMap::new()),
		})
	}

	/// Pins the EIP-712 domain of `token` instead of reading it on first use.
	pub fn with_domain(mut self, token: Address, name: String, version: Option<String>) -> Self {
		self.configured_domains
			.insert(token, PermitDomain::new(name, version, self.chain_id));
		self
	}

	async fn call_view<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, OracleError> {
		let request = TransactionRequest::default()
			.to(to)
			.input(call.abi_encode().into());
		let output = self
			.provider
			.call(&request)
			.await
			.map_err(|e| classify_call_error(&format!("eth_call to {}", to), e))?;
		C::abi_decode_returns(&output, true)
			.map_err(|e| OracleError::Network(format!("Undecodable response from {}: {}", to, e)))
	}

	async fn domain_for(&self, token: Address) -> Result<PermitDomain, OracleError> {
		if let Some(domain) = self.configured_domains.get(&token) {
			return Ok(domain.clone());
		}
		if let Some(domain) = self.discovered_domains.read().await.get(&token) {
			return Ok(domain.clone());
		}

		let name = self.call_view(token, nameCall {}).await?._0;
		let version = match self.call_view(token, versionCall {}).await {
			Ok(ret) => Some(ret._0),
			Err(OracleError::Rejected { .. }) => {
				tracing::debug!(token = %token, "Token has no version(), using default");
				None
			},
			Err(e) => return Err(e),
		};
		let domain = PermitDomain::new(name, version, self.chain_id);
		tracing::info!(
			token = %token,
			name = %domain.name,
			version = %domain.version,
			"Discovered permit domain"
		);
		self.discovered_domains
			.write()
			.await
			.insert(token, domain.clone());
		Ok(domain)
	}
}

#[async_trait]
impl OracleInterface for AlloyOracle {
	fn family(&self) -> ChainFamily {
		ChainFamily::Evm
	}

	fn verifier(&self) -> Identity {
		Identity::Evm(self.gateway)
	}

	fn relayer(&self) -> Identity {
		Identity::Evm(self.relayer)
	}

	fn chain_id(&self) -> Option<u64> {
		Some(self.chain_id)
	}

	async fn encoder(&self, asset: &Identity) -> Result<Box<dyn PermitEncoder>, OracleError> {
		let domain = self.domain_for(asset.evm("asset")?).await?;
		Ok(Box::new(StructuredEncoder::new(domain)))
	}

	async fn permit_domain(&self, asset: &Identity) -> Result<Option<PermitDomain>, OracleError> {
		self.domain_for(asset.evm("asset")?).await.map(Some)
	}

	async fn current_nonce(&self, owner: &Identity, asset: &Identity) -> Result<U256, OracleError> {
		let call = noncesCall {
			owner: owner.evm("owner")?,
		};
		Ok(self.call_view(asset.evm("asset")?, call).await?._0)
	}

	async fn is_nonce_consumed(
		&self,
		owner: &Identity,
		asset: &Identity,
		nonce: U256,
	) -> Result<bool, OracleError> {
		Ok(nonce < self.current_nonce(owner, asset).await?)
	}

	async fn submit(&self, plan: &ExecutionPlan) -> Result<SettlementReference, OracleError> {
		let ExecutionPlan::SingleCall(call) = plan else {
			return Err(OracleError::rejected(
				RejectReason::Other,
				"EVM oracle only accepts single-call plans",
			));
		};
		if call.chain_id != self.chain_id || call.target != self.gateway {
			return Err(OracleError::rejected(
				RejectReason::Other,
				format!(
					"plan targets {} on chain {}, client is bound to {} on chain {}",
					call.target, call.chain_id, self.gateway, self.chain_id
				),
			));
		}

		let request = TransactionRequest::default()
			.from(self.relayer)
			.to(call.target)
			.input(call.calldata.clone().into());

		// Dry run so reverts come back with their reason instead of a mined failure.
		self.provider
			.call(&request)
			.await
			.map_err(|e| classify_call_error("Simulation failed", e))?;

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(|e| classify_call_error("Failed to send transaction", e))?;
		let tx_hash = *pending.tx_hash();
		tracing::info!(
			tx_hash = %with_0x_prefix(&alloy_primitives::hex::encode(tx_hash.0)),
			chain_id = self.chain_id,
			"Submitted transaction"
		);
		Ok(SettlementReference::evm(tx_hash.0))
	}

	async fn wait_for_confirmation(
		&self,
		reference: &SettlementReference,
		confirmations: u64,
	) -> Result<TransactionReceipt, OracleError> {
		let tx_hash = B256::try_from(reference.bytes.as_slice()).map_err(|_| {
			OracleError::NotFound(format!("{} is not a transaction hash", reference))
		})?;

		loop {
			let receipt = match self.provider.get_transaction_receipt(tx_hash).await {
				Ok(Some(receipt)) => receipt,
				Ok(None) => {
					tokio::time::sleep(self.poll_interval).await;
					continue;
				},
				Err(e) => {
					return Err(OracleError::Network(format!("Failed to get receipt: {}", e)));
				},
			};

			let current_block = self.provider.get_block_number().await.map_err(|e| {
				OracleError::Network(format!("Failed to get block number: {}", e))
			})?;
			let tx_block = receipt.block_number.unwrap_or(0);
			// The inclusion block counts as the first confirmation.
			let current_confirmations = current_block.saturating_sub(tx_block) + 1;

			if current_confirmations >= confirmations {
				return Ok(TransactionReceipt {
					reference: reference.clone(),
					block_number: tx_block,
					success: receipt.status(),
				});
			}

			tracing::debug!(
				"Waiting for {} more confirmations...",
				confirmations.saturating_sub(current_confirmations)
			);
			tokio::time::sleep(self.poll_interval).await;
		}
	}

	async fn balance(&self, holder: &Identity, asset: &Identity) -> Result<U256, OracleError> {
		let call = balanceOfCall {
			account: holder.evm("holder")?,
		};
		Ok(self.call_view(asset.evm("asset")?, call).await?._0)
	}
}

/// Builds the Alloy gateway client.
///
/// Configuration parameters:
/// - `rpc_url` (required): JSON-RPC endpoint
/// - `chain_id` (required)
/// - `verifier` (required): gateway contract address
/// - `private_key` (required): relayer key, hex
/// - `poll_interval_ms`: receipt polling interval (default: 2000)
/// - `tokens`: table of token address to `{ name, version }` domain overrides
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn OracleInterface>, OracleError> {
	let rpc_url = config_str(config, "rpc_url")?;
	let chain_id = config_u64(config, "chain_id", 0)?;
	if chain_id == 0 {
		return Err(OracleError::Configuration(
			"chain_id is required and must be positive".to_string(),
		));
	}
	let gateway = config_identity(config, "verifier", ChainFamily::Evm)?.evm("verifier")?;
	let signer = load_evm_key(&config_secret(config, "private_key")?)
		.map_err(|e| OracleError::Configuration(e.to_string()))?;
	let poll_interval = Duration::from_millis(config_u64(config, "poll_interval_ms", 2000)?);

	let mut oracle = AlloyOracle::new(rpc_url, chain_id, gateway, signer, poll_interval)?;

	if let Some(tokens) = config.get("tokens").and_then(|v| v.as_table()) {
		for (address, domain) in tokens {
			let token: Address = address.parse().map_err(|e| {
				OracleError::Configuration(format!("Invalid token address {}: {}", address, e))
			})?;
			let name = config_str(domain, "name")?.to_string();
			let version = domain
				.get("version")
				.and_then(|v| v.as_str())
				.map(str::to_string);
			oracle = oracle.with_domain(token, name, version);
		}
	}

	Ok(Box::new(oracle))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = OracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl OracleRegistry for Registry {}
