//! Escrow program client over Solana JSON-RPC.
//!
//! Transactions are signed locally (see [`super::transaction`]) and sent with
//! preflight simulation, so program errors come back with the failing
//! instruction index and custom code.

use super::transaction::{relayer_keypair, sign_transaction, signature_bytes};
use crate::{
	config_identity, config_secret, config_str, config_u64, OracleError, OracleFactory,
	OracleInterface, OracleRegistry, RejectReason,
};
use alloy_primitives::U256;
use async_trait::async_trait;
use relay_account::load_ed25519_key;
use relay_message::{
	program::{
		associated_token_address, escrow_authority, from_solana_pubkey, state_address,
		to_solana_pubkey, EscrowState, ProgramErrorCode,
	},
	FlatEncoder, PermitDomain, PermitEncoder,
};
use relay_types::{
	utils::u256_to_u64, ChainFamily, ExecutionPlan, Identity, ImplementationRegistry, Pubkey,
	SettlementReference, TransactionReceipt,
};
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{
	client_error::{Error as ClientError, ErrorKind as ClientErrorKind},
	config::RpcSendTransactionConfig,
	request::{RpcError, RpcResponseErrorData},
};
use solana_sdk::{
	commitment_config::CommitmentConfig,
	instruction::InstructionError,
	signature::{Keypair, Signature, Signer},
	transaction::TransactionError,
};
use std::time::Duration;

/// SPL token `InsufficientFunds`.
const TOKEN_INSUFFICIENT_FUNDS: u32 = 1;

/// Whether a status seen at the configured commitment has at least
/// `required` confirmations. No confirmation count means rooted.
fn is_settled(satisfies_commitment: bool, confirmations: Option<usize>, required: u64) -> bool {
	let count = confirmations
		.map(|c| c as u64 + 1)
		.unwrap_or(u64::MAX);
	satisfies_commitment && count >= required
}

/// Maps a transaction error to a rejection reason.
///
/// Index 0 is the ed25519 verification; custom codes on the transfer
/// instruction are the escrow program's errors, or SPL token errors raised
/// through CPI.
pub fn classify_transaction_error(err: &TransactionError, logs: &[String]) -> OracleError {
	let summary = match logs.iter().rev().find(|l| l.contains("Error")) {
		Some(log) => format!("{} ({})", err, log),
		None => err.to_string(),
	};

	let reason = match err {
		TransactionError::InstructionError(0, _) => {
			return OracleError::rejected(
				RejectReason::InvalidSignature,
				format!("ed25519 verification failed: {}", summary),
			);
		},
		TransactionError::InstructionError(_, InstructionError::Custom(code)) => {
			match ProgramErrorCode::from_code(*code) {
				Some(ProgramErrorCode::DeadlineExpired) => RejectReason::Expired,
				Some(ProgramErrorCode::InvalidNonce) => RejectReason::NonceConsumed,
				Some(_) => RejectReason::InvalidSignature,
				None if *code == TOKEN_INSUFFICIENT_FUNDS => RejectReason::InsufficientFunds,
				None => RejectReason::Other,
			}
		},
		TransactionError::InstructionError(..)
			if logs.iter().any(|l| l.contains("insufficient funds")) =>
		{
			RejectReason::InsufficientFunds
		},
		TransactionError::BlockhashNotFound => {
			return OracleError::Network(format!("transaction expired: {}", summary));
		},
		TransactionError::AlreadyProcessed => RejectReason::NonceConsumed,
		_ => RejectReason::Other,
	};
	OracleError::rejected(reason, summary)
}

/// Classifies a client error. Preflight failures carry the transaction error
/// and program logs; everything else is a transport or node problem.
fn client_error(method: &str, error: ClientError) -> OracleError {
	if let Some(err) = error.get_transaction_error() {
		let logs = match error.kind() {
			ClientErrorKind::RpcError(RpcError::RpcResponseError {
				data: RpcResponseErrorData::SendTransactionPreflightFailure(result),
				..
			}) => result.logs.clone().unwrap_or_default(),
			_ => Vec::new(),
		};
		return classify_transaction_error(&err, &logs);
	}
	OracleError::Network(format!("{} failed: {}", method, error))
}

fn parse_commitment(value: &str) -> Result<CommitmentConfig, OracleError> {
	match value {
		"processed" => Ok(CommitmentConfig::processed()),
		"confirmed" => Ok(CommitmentConfig::confirmed()),
		"finalized" => Ok(CommitmentConfig::finalized()),
		other => Err(OracleError::Configuration(format!(
			"unknown commitment '{}'",
			other
		))),
	}
}

pub struct SvmRpcOracle {
	client: RpcClient,
	program_id: Pubkey,
	relayer: Keypair,
	poll_interval: Duration,
}

impl SvmRpcOracle {
	pub fn new(
		rpc_url: impl Into<String>,
		program_id: Pubkey,
		relayer: Keypair,
		commitment: CommitmentConfig,
		poll_interval: Duration,
	) -> Self {
		Self::with_client(
			RpcClient::new_with_commitment(rpc_url.into(), commitment),
			program_id,
			relayer,
			poll_interval,
		)
	}

	pub fn with_client(
		client: RpcClient,
		program_id: Pubkey,
		relayer: Keypair,
		poll_interval: Duration,
	) -> Self {
		Self {
			client,
			program_id,
			relayer,
			poll_interval,
		}
	}

	fn relayer_pubkey(&self) -> Pubkey {
		from_solana_pubkey(&self.relayer.pubkey())
	}

	async fn escrow_state(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<EscrowState>, OracleError> {
		let state = state_address(owner, mint, &self.program_id)
			.ok_or_else(|| OracleError::Configuration("no valid state address".to_string()))?;
		let account = self
			.client
			.get_account_with_commitment(&to_solana_pubkey(&state), self.client.commitment())
			.await
			.map_err(|e| client_error("getAccountInfo", e))?
			.value;

		match account {
			Some(account) => Ok(Some(EscrowState::decode(&account.data)?)),
			None => Ok(None),
		}
	}

	async fn token_balance(&self, account: &Pubkey) -> Result<u64, OracleError> {
		match self
			.client
			.get_token_account_balance(&to_solana_pubkey(account))
			.await
		{
			Ok(balance) => balance.amount.parse().map_err(|e| {
				OracleError::Network(format!("invalid token amount '{}': {}", balance.amount, e))
			}),
			Err(e) if e.to_string().contains("could not find account") => Ok(0),
			Err(e) => Err(client_error("getTokenAccountBalance", e)),
		}
	}
}

#[async_trait]
impl OracleInterface for SvmRpcOracle {
	fn family(&self) -> ChainFamily {
		ChainFamily::Svm
	}

	fn verifier(&self) -> Identity {
		Identity::Svm(self.program_id)
	}

	fn relayer(&self) -> Identity {
		Identity::Svm(self.relayer_pubkey())
	}

	fn chain_id(&self) -> Option<u64> {
		None
	}

	async fn encoder(&self, asset: &Identity) -> Result<Box<dyn PermitEncoder>, OracleError> {
		asset.svm("asset")?;
		Ok(Box::new(FlatEncoder))
	}

	async fn permit_domain(&self, asset: &Identity) -> Result<Option<PermitDomain>, OracleError> {
		asset.svm("asset")?;
		Ok(None)
	}

	async fn current_nonce(&self, owner: &Identity, asset: &Identity) -> Result<U256, OracleError> {
		let last = self
			.escrow_state(&owner.svm("owner")?, &asset.svm("asset")?)
			.await?
			.map(|state| state.last_nonce)
			.unwrap_or(0);
		Ok(U256::from(last) + U256::from(1u8))
	}

	async fn is_nonce_consumed(
		&self,
		owner: &Identity,
		asset: &Identity,
		nonce: U256,
	) -> Result<bool, OracleError> {
		let nonce = u256_to_u64("nonce", nonce)?;
		let last = self
			.escrow_state(&owner.svm("owner")?, &asset.svm("asset")?)
			.await?
			.map(|state| state.last_nonce)
			.unwrap_or(0);
		Ok(nonce <= last)
	}

	async fn submit(&self, plan: &ExecutionPlan) -> Result<SettlementReference, OracleError> {
		let ExecutionPlan::ComposedInstructions(composed) = plan else {
			return Err(OracleError::rejected(
				RejectReason::Other,
				"SVM oracle only accepts composed instruction plans",
			));
		};

		let blockhash = self
			.client
			.get_latest_blockhash()
			.await
			.map_err(|e| client_error("getLatestBlockhash", e))?;
		let tx = sign_transaction(composed, blockhash, &self.relayer)?;

		let config = RpcSendTransactionConfig {
			preflight_commitment: Some(self.client.commitment().commitment),
			..RpcSendTransactionConfig::default()
		};
		let signature = self
			.client
			.send_transaction_with_config(&tx, config)
			.await
			.map_err(|e| client_error("sendTransaction", e))?;

		let reference = SettlementReference::svm(signature_bytes(&signature));
		tracing::info!(signature = %reference, "Submitted transaction");
		Ok(reference)
	}

	async fn wait_for_confirmation(
		&self,
		reference: &SettlementReference,
		confirmations: u64,
	) -> Result<TransactionReceipt, OracleError> {
		let signature = Signature::try_from(reference.bytes.as_slice()).map_err(|_| {
			OracleError::rejected(
				RejectReason::Other,
				format!("{} is not a transaction signature", reference),
			)
		})?;
		let commitment = self.client.commitment();

		loop {
			let statuses = self
				.client
				.get_signature_statuses_with_history(&[signature])
				.await
				.map_err(|e| client_error("getSignatureStatuses", e))?
				.value;

			if let Some(Some(status)) = statuses.into_iter().next() {
				if let Some(err) = &status.err {
					return Err(classify_transaction_error(err, &[]));
				}
				if is_settled(
					status.satisfies_commitment(commitment),
					status.confirmations,
					confirmations,
				) {
					return Ok(TransactionReceipt {
						reference: reference.clone(),
						block_number: status.slot,
						success: true,
					});
				}
				tracing::debug!(
					slot = status.slot,
					status = ?status.confirmation_status,
					"Waiting for confirmation"
				);
			}
			tokio::time::sleep(self.poll_interval).await;
		}
	}

	async fn balance(&self, holder: &Identity, asset: &Identity) -> Result<U256, OracleError> {
		let holder = holder.svm("holder")?;
		let mint = asset.svm("asset")?;
		let underivable = || OracleError::Configuration("no valid token account".to_string());

		let wallet_ata = associated_token_address(&holder, &mint);
		let escrow = escrow_authority(&holder, &mint, &self.program_id).ok_or_else(underivable)?;
		let escrow_ata = associated_token_address(&escrow, &mint);

		let wallet = self.token_balance(&wallet_ata).await?;
		let escrowed = self.token_balance(&escrow_ata).await?;
		Ok(U256::from(wallet) + U256::from(escrowed))
	}
}

/// Builds the JSON-RPC escrow program client.
///
/// Configuration parameters:
/// - `rpc_url` (required): JSON-RPC endpoint
/// - `verifier` (required): escrow program id
/// - `private_key` (required): relayer keypair (JSON array, base58 or hex)
/// - `commitment`: "processed", "confirmed" or "finalized" (default: "confirmed")
/// - `poll_interval_ms`: status polling interval (default: 1000)
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn OracleInterface>, OracleError> {
	let rpc_url = config_str(config, "rpc_url")?;
	let program_id = config_identity(config, "verifier", ChainFamily::Svm)?.svm("verifier")?;
	let relayer = load_ed25519_key(&config_secret(config, "private_key")?)
		.map_err(|e| OracleError::Configuration(e.to_string()))?;
	let commitment = parse_commitment(
		config
			.get("commitment")
			.and_then(|v| v.as_str())
			.unwrap_or("confirmed"),
	)?;
	let poll_interval = Duration::from_millis(config_u64(config, "poll_interval_ms", 1000)?);

	Ok(Box::new(SvmRpcOracle::new(
		rpc_url,
		program_id,
		relayer_keypair(&relayer)?,
		commitment,
		poll_interval,
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "svm_rpc";
	type Factory = OracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl OracleRegistry for Registry {}
