//! In-memory verification oracle.
//!
//! Applies the same rules as the deployed gateway contract and escrow program
//! to a local ledger: expiry, nonce freshness, signature validity and balance,
//! then consumes the nonce and moves funds in one step under a single lock.
//! Used by tests and for local development without a chain.

use crate::{
	config_identity, config_str, config_u64, OracleError, OracleFactory, OracleInterface,
	OracleRegistry, RejectReason,
};
use alloy_primitives::{keccak256, Address, U256};
use async_trait::async_trait;
use relay_message::{
	flat::verify_ed25519,
	gateway::decode_send,
	program::{
		associated_token_address, escrow_authority, parse_ed25519_instruction,
		RelayedTransferAccounts, RelayedTransferArgs, ED25519_PROGRAM_ID,
	},
	FlatEncoder, PermitDomain, PermitEncoder, StructuredEncoder,
};
use relay_types::{
	utils::parse_decimal_u256, ChainFamily, Clock, ComposedInstructionPlan, ExecutionPlan,
	Identity, ImplementationRegistry, PermitParameters, Pubkey, SettlementReference,
	SingleCallPlan, SystemClock, TransactionReceipt,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_CHAIN_ID: u64 = 31337;
pub const DEFAULT_TOKEN_NAME: &str = "Token";

/// Per-owner replay protection state.
pub trait NonceRegistry: Send + Sync {
	/// The next nonce that would be accepted.
	fn current(&self, owner: &Identity, asset: &Identity) -> U256;

	fn is_consumed(&self, owner: &Identity, asset: &Identity, nonce: U256) -> bool;

	/// Marks `nonce` consumed. Fails without change if it is not acceptable.
	fn consume(&mut self, owner: &Identity, asset: &Identity, nonce: U256)
		-> Result<(), OracleError>;
}

/// ERC-2612 counters: the nonce must equal the counter, which then increments.
#[derive(Debug, Default)]
pub struct SequentialNonces {
	next: HashMap<(Identity, Identity), U256>,
}

impl NonceRegistry for SequentialNonces {
	fn current(&self, owner: &Identity, asset: &Identity) -> U256 {
		self.next
			.get(&(*owner, *asset))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	fn is_consumed(&self, owner: &Identity, asset: &Identity, nonce: U256) -> bool {
		nonce < self.current(owner, asset)
	}

	fn consume(
		&mut self,
		owner: &Identity,
		asset: &Identity,
		nonce: U256,
	) -> Result<(), OracleError> {
		let current = self.current(owner, asset);
		if nonce != current {
			return Err(OracleError::rejected(
				RejectReason::NonceConsumed,
				format!("nonce {} is not the current nonce {}", nonce, current),
			));
		}
		self.next.insert((*owner, *asset), current + U256::from(1u8));
		Ok(())
	}
}

/// Escrow-program watermark: a nonce is fresh iff it exceeds `last_nonce`.
#[derive(Debug, Default)]
pub struct WatermarkNonces {
	last: HashMap<(Identity, Identity), U256>,
}

impl WatermarkNonces {
	fn last(&self, owner: &Identity, asset: &Identity) -> U256 {
		self.last
			.get(&(*owner, *asset))
			.copied()
			.unwrap_or(U256::ZERO)
	}
}

impl NonceRegistry for WatermarkNonces {
	fn current(&self, owner: &Identity, asset: &Identity) -> U256 {
		self.last(owner, asset).saturating_add(U256::from(1u8))
	}

	fn is_consumed(&self, owner: &Identity, asset: &Identity, nonce: U256) -> bool {
		nonce <= self.last(owner, asset)
	}

	fn consume(
		&mut self,
		owner: &Identity,
		asset: &Identity,
		nonce: U256,
	) -> Result<(), OracleError> {
		if self.is_consumed(owner, asset, nonce) {
			return Err(OracleError::rejected(
				RejectReason::NonceConsumed,
				format!("InvalidNonce: {} <= last_nonce {}", nonce, self.last(owner, asset)),
			));
		}
		self.last.insert((*owner, *asset), nonce);
		Ok(())
	}
}

struct Ledger {
	nonces: Box<dyn NonceRegistry>,
	/// Keyed by (account, asset). SVM accounts are token accounts.
	balances: HashMap<(Identity, Identity), U256>,
	settlements: HashMap<SettlementReference, TransactionReceipt>,
	block: u64,
}

impl Ledger {
	fn balance(&self, account: &Identity, asset: &Identity) -> U256 {
		self.balances
			.get(&(*account, *asset))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	fn credit(&mut self, account: Identity, asset: Identity, amount: U256) {
		let entry = self.balances.entry((account, asset)).or_insert(U256::ZERO);
		*entry = entry.saturating_add(amount);
	}
}

/// A pending transfer, validated and ready to apply.
struct Settlement {
	owner: Identity,
	asset: Identity,
	nonce: U256,
	debit: Identity,
	receiver: Identity,
	relayer: Identity,
	amount: U256,
	fee: U256,
}

pub struct MemoryOracle {
	family: ChainFamily,
	verifier: Identity,
	relayer: Identity,
	chain_id: u64,
	token_name: String,
	token_version: Option<String>,
	clock: Arc<dyn Clock>,
	ledger: Mutex<Ledger>,
	pending_failures: AtomicU32,
}

impl MemoryOracle {
	/// Creates an empty ledger for one deployment, with the nonce scheme of
	/// `verifier`'s chain family.
	pub fn new(verifier: Identity, relayer: Identity) -> Result<Self, OracleError> {
		let family = verifier.family();
		relayer.require_family(family, "relayer")?;
		let nonces: Box<dyn NonceRegistry> = match family {
			ChainFamily::Evm => Box::new(SequentialNonces::default()),
			ChainFamily::Svm => Box::new(WatermarkNonces::default()),
		};
		Ok(Self {
			family,
			verifier,
			relayer,
			chain_id: DEFAULT_CHAIN_ID,
			token_name: DEFAULT_TOKEN_NAME.to_string(),
			token_version: None,
			clock: Arc::new(SystemClock),
			ledger: Mutex::new(Ledger {
				nonces,
				balances: HashMap::new(),
				settlements: HashMap::new(),
				block: 0,
			}),
			pending_failures: AtomicU32::new(0),
		})
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_nonce_registry(mut self, nonces: Box<dyn NonceRegistry>) -> Self {
		self.ledger.get_mut().nonces = nonces;
		self
	}

	pub fn with_chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	/// EIP-712 domain name and version used by every token.
	pub fn with_token_domain(mut self, name: impl Into<String>, version: Option<String>) -> Self {
		self.token_name = name.into();
		self.token_version = version;
		self
	}

	pub fn with_balance(
		mut self,
		holder: &Identity,
		asset: &Identity,
		amount: U256,
	) -> Result<Self, OracleError> {
		let account = self.funding_account(holder, asset)?;
		self.ledger.get_mut().credit(account, *asset, amount);
		Ok(self)
	}

	/// Adds funds the holder can spend through permits: the wallet itself on
	/// EVM, the holder's escrow token account on SVM.
	pub async fn credit(
		&self,
		holder: &Identity,
		asset: &Identity,
		amount: U256,
	) -> Result<(), OracleError> {
		let account = self.funding_account(holder, asset)?;
		self.ledger.lock().await.credit(account, *asset, amount);
		Ok(())
	}

	/// Makes the next `count` submissions fail as network errors.
	pub fn fail_next_submissions(&self, count: u32) {
		self.pending_failures.store(count, Ordering::SeqCst);
	}

	fn domain(&self) -> PermitDomain {
		PermitDomain::new(
			self.token_name.clone(),
			self.token_version.clone(),
			self.chain_id,
		)
	}

	fn funding_account(&self, holder: &Identity, asset: &Identity) -> Result<Identity, OracleError> {
		holder.require_family(self.family, "holder")?;
		asset.require_family(self.family, "asset")?;
		match (holder, asset) {
			(Identity::Svm(owner), Identity::Svm(mint)) => {
				let program = self.verifier.svm("verifier")?;
				let escrow = escrow_authority(owner, mint, &program)
					.ok_or_else(|| underivable("escrow authority"))?;
				Ok(token_account(&escrow, mint))
			},
			_ => Ok(*holder),
		}
	}

	fn wallet_account(&self, holder: &Identity, asset: &Identity) -> Result<Identity, OracleError> {
		match (holder, asset) {
			(Identity::Svm(wallet), Identity::Svm(mint)) => Ok(token_account(wallet, mint)),
			_ => Ok(*holder),
		}
	}

	fn check_single_call(
		&self,
		ledger: &Ledger,
		plan: &SingleCallPlan,
	) -> Result<Settlement, OracleError> {
		if Identity::Evm(plan.target) != self.verifier {
			return Err(OracleError::rejected(
				RejectReason::Other,
				format!("call target {} is not the gateway", plan.target),
			));
		}
		if plan.chain_id != self.chain_id {
			return Err(OracleError::rejected(
				RejectReason::Other,
				format!("plan for chain {} sent to chain {}", plan.chain_id, self.chain_id),
			));
		}

		let args = decode_send(&plan.calldata)?;
		let owner = Identity::Evm(args.sender);
		let asset = Identity::Evm(args.token);
		let deadline = if args.deadline > U256::from(i64::MAX as u64) {
			i64::MAX
		} else {
			args.deadline.to::<u64>() as i64
		};
		if self.clock.now() > deadline {
			return Err(OracleError::rejected(
				RejectReason::Expired,
				format!("ERC2612ExpiredSignature({})", deadline),
			));
		}

		// The token verifies against its own counter, not a caller-chosen nonce.
		let nonce = ledger.nonces.current(&owner, &asset);
		let params = PermitParameters::new(
			owner,
			self.verifier,
			asset,
			args.amount,
			args.fee,
			deadline,
			nonce,
		)?;
		StructuredEncoder::new(self.domain())
			.verify(&params, &args.signature(), &owner)
			.map_err(|e| {
				OracleError::rejected(
					RejectReason::InvalidSignature,
					format!("ERC2612InvalidSigner: {}", e),
				)
			})?;

		Ok(Settlement {
			owner,
			asset,
			nonce,
			debit: owner,
			receiver: Identity::Evm(args.receiver),
			relayer: self.relayer,
			amount: args.amount,
			fee: args.fee,
		})
	}

	fn check_instructions(
		&self,
		ledger: &Ledger,
		plan: &ComposedInstructionPlan,
	) -> Result<Settlement, OracleError> {
		let [verify_ix, transfer_ix] = plan.instructions.as_slice() else {
			return Err(OracleError::rejected(
				RejectReason::Other,
				format!(
					"expected ed25519 verification and relayed_transfer, got {} instructions",
					plan.instructions.len()
				),
			));
		};
		if verify_ix.program_id != ED25519_PROGRAM_ID {
			return Err(OracleError::rejected(
				RejectReason::Other,
				"instruction 0 is not an ed25519 verification",
			));
		}
		let payload = parse_ed25519_instruction(&verify_ix.data)?;
		verify_ed25519(
			payload.public_key.as_bytes(),
			&payload.signature,
			&payload.message,
		)
		.map_err(|e| {
			OracleError::rejected(
				RejectReason::InvalidSignature,
				format!("instruction 0 failed: {}", e),
			)
		})?;

		let program = self.verifier.svm("verifier")?;
		if transfer_ix.program_id != program {
			return Err(OracleError::rejected(
				RejectReason::Other,
				format!("program {} is not the escrow program", transfer_ix.program_id),
			));
		}
		let args = RelayedTransferArgs::decode(&transfer_ix.data)?;
		let accounts = RelayedTransferAccounts::from_metas(&transfer_ix.accounts)?;
		let relayer = self.relayer.svm("relayer")?;
		if accounts.relayer != plan.fee_payer || accounts.relayer != relayer {
			return Err(OracleError::rejected(
				RejectReason::Other,
				"relayer account must be the fee payer",
			));
		}

		if self.clock.now() > args.deadline {
			return Err(OracleError::rejected(
				RejectReason::Expired,
				format!("DeadlineExpired (6000): deadline {}", args.deadline),
			));
		}
		if payload.public_key != args.sig_pubkey {
			return Err(OracleError::rejected(
				RejectReason::InvalidSignature,
				"SignaturePubkeyMismatch (6003)",
			));
		}

		let owner = args.sig_pubkey;
		let mint = accounts.mint;
		let escrow = escrow_authority(&owner, &mint, &program)
			.ok_or_else(|| underivable("escrow authority"))?;
		let expected = RelayedTransferAccounts::derive(&program, &owner, &mint, &relayer, &relayer)?;
		if accounts.escrow_authority != escrow
			|| accounts.escrow_token_account != expected.escrow_token_account
			|| accounts.state != expected.state
			|| accounts.relayer_token_account != expected.relayer_token_account
		{
			return Err(OracleError::rejected(
				RejectReason::Other,
				"ConstraintSeeds: account does not match its derivation",
			));
		}

		let owner_id = Identity::Svm(owner);
		let asset = Identity::Svm(mint);
		let nonce = U256::from(args.nonce);
		if ledger.nonces.is_consumed(&owner_id, &asset, nonce) {
			return Err(OracleError::rejected(
				RejectReason::NonceConsumed,
				format!("InvalidNonce (6001): nonce {}", args.nonce),
			));
		}

		let params = PermitParameters::new(
			owner_id,
			self.verifier,
			asset,
			U256::from(args.amount),
			U256::from(args.fee),
			args.deadline,
			nonce,
		)?;
		if payload.message != FlatEncoder::message(&params)? {
			return Err(OracleError::rejected(
				RejectReason::InvalidSignature,
				"SignatureMessageMismatch (6002)",
			));
		}

		Ok(Settlement {
			owner: owner_id,
			asset,
			nonce,
			debit: Identity::Svm(accounts.escrow_token_account),
			receiver: Identity::Svm(accounts.receiver_token_account),
			relayer: Identity::Svm(accounts.relayer_token_account),
			amount: U256::from(args.amount),
			fee: U256::from(args.fee),
		})
	}

	fn apply(&self, ledger: &mut Ledger, settlement: Settlement) -> Result<(), OracleError> {
		let total = settlement.amount.checked_add(settlement.fee).ok_or_else(|| {
			OracleError::rejected(RejectReason::Other, "amount + fee overflows")
		})?;
		if self.family == ChainFamily::Svm && total > U256::from(u64::MAX) {
			return Err(OracleError::rejected(
				RejectReason::Other,
				"amount + fee overflows u64",
			));
		}
		let available = ledger.balance(&settlement.debit, &settlement.asset);
		if available < total {
			return Err(OracleError::rejected(
				RejectReason::InsufficientFunds,
				format!(
					"ERC20InsufficientBalance: balance {} < required {}",
					available, total
				),
			));
		}

		ledger
			.nonces
			.consume(&settlement.owner, &settlement.asset, settlement.nonce)?;
		ledger
			.balances
			.insert((settlement.debit, settlement.asset), available - total);
		ledger.credit(settlement.receiver, settlement.asset, settlement.amount);
		ledger.credit(settlement.relayer, settlement.asset, settlement.fee);
		Ok(())
	}

	fn record(&self, ledger: &mut Ledger, payload: &[u8]) -> SettlementReference {
		ledger.block += 1;
		let mut preimage = payload.to_vec();
		preimage.extend_from_slice(&ledger.block.to_be_bytes());
		let hash = keccak256(&preimage);
		let reference = match self.family {
			ChainFamily::Evm => SettlementReference::evm(hash.0),
			ChainFamily::Svm => {
				let mut signature = [0u8; 64];
				signature[..32].copy_from_slice(hash.as_slice());
				signature[32..].copy_from_slice(keccak256(hash).as_slice());
				SettlementReference::svm(signature)
			},
		};
		ledger.settlements.insert(
			reference.clone(),
			TransactionReceipt {
				reference: reference.clone(),
				block_number: ledger.block,
				success: true,
			},
		);
		reference
	}
}

fn underivable(what: &str) -> OracleError {
	OracleError::Configuration(format!("no valid program address for {}", what))
}

fn token_account(wallet: &Pubkey, mint: &Pubkey) -> Identity {
	Identity::Svm(associated_token_address(wallet, mint))
}

#[async_trait]
impl OracleInterface for MemoryOracle {
	fn family(&self) -> ChainFamily {
		self.family
	}

	fn verifier(&self) -> Identity {
		self.verifier
	}

	fn relayer(&self) -> Identity {
		self.relayer
	}

	fn chain_id(&self) -> Option<u64> {
		match self.family {
			ChainFamily::Evm => Some(self.chain_id),
			ChainFamily::Svm => None,
		}
	}

	async fn encoder(&self, asset: &Identity) -> Result<Box<dyn PermitEncoder>, OracleError> {
		asset.require_family(self.family, "asset")?;
		Ok(match self.family {
			ChainFamily::Evm => Box::new(StructuredEncoder::new(self.domain())),
			ChainFamily::Svm => Box::new(FlatEncoder),
		})
	}

	async fn permit_domain(&self, asset: &Identity) -> Result<Option<PermitDomain>, OracleError> {
		asset.require_family(self.family, "asset")?;
		Ok(match self.family {
			ChainFamily::Evm => Some(self.domain()),
			ChainFamily::Svm => None,
		})
	}

	async fn current_nonce(&self, owner: &Identity, asset: &Identity) -> Result<U256, OracleError> {
		Ok(self.ledger.lock().await.nonces.current(owner, asset))
	}

	async fn is_nonce_consumed(
		&self,
		owner: &Identity,
		asset: &Identity,
		nonce: U256,
	) -> Result<bool, OracleError> {
		Ok(self
			.ledger
			.lock()
			.await
			.nonces
			.is_consumed(owner, asset, nonce))
	}

	async fn submit(&self, plan: &ExecutionPlan) -> Result<SettlementReference, OracleError> {
		if plan.family() != self.family {
			return Err(OracleError::rejected(
				RejectReason::Other,
				format!("{} plan sent to a {} oracle", plan.family(), self.family),
			));
		}
		let injected = self
			.pending_failures
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if injected {
			return Err(OracleError::Network("connection reset by peer".to_string()));
		}

		let mut ledger = self.ledger.lock().await;
		let (settlement, payload) = match plan {
			ExecutionPlan::SingleCall(call) => {
				(self.check_single_call(&ledger, call)?, call.calldata.clone())
			},
			ExecutionPlan::ComposedInstructions(composed) => {
				let payload = composed
					.instructions
					.iter()
					.flat_map(|ix| ix.data.iter().copied())
					.collect::<Vec<_>>();
				(self.check_instructions(&ledger, composed)?, payload)
			},
		};
		self.apply(&mut ledger, settlement)?;
		let reference = self.record(&mut ledger, &payload);
		tracing::debug!(reference = %reference, block = ledger.block, "Settled in memory");
		Ok(reference)
	}

	async fn wait_for_confirmation(
		&self,
		reference: &SettlementReference,
		_confirmations: u64,
	) -> Result<TransactionReceipt, OracleError> {
		self.ledger
			.lock()
			.await
			.settlements
			.get(reference)
			.cloned()
			.ok_or_else(|| OracleError::NotFound(format!("settlement {}", reference)))
	}

	async fn balance(&self, holder: &Identity, asset: &Identity) -> Result<U256, OracleError> {
		let wallet = self.wallet_account(holder, asset)?;
		let ledger = self.ledger.lock().await;
		let mut total = ledger.balance(&wallet, asset);
		if self.family == ChainFamily::Svm {
			let escrow = self.funding_account(holder, asset)?;
			total = total.saturating_add(ledger.balance(&escrow, asset));
		}
		Ok(total)
	}
}

/// Builds a memory oracle.
///
/// Configuration parameters:
/// - `family`: "evm" or "svm"
/// - `verifier`: gateway address or program id
/// - `relayer`: relayer identity (default: a fixed placeholder)
/// - `chain_id`: EVM chain id (default: 31337)
/// - `token_name` / `token_version`: EIP-712 domain of every token
/// - `balances`: array of `{ holder, asset, amount }` seeded at start, with
///   `amount` a decimal string in base units
pub fn create_oracle(config: &toml::Value) -> Result<Box<dyn OracleInterface>, OracleError> {
	let family: ChainFamily = config_str(config, "family")?
		.parse()
		.map_err(|e: relay_types::EncodingError| OracleError::Configuration(e.to_string()))?;
	let verifier = config_identity(config, "verifier", family)?;
	let relayer = match config.get("relayer") {
		Some(_) => config_identity(config, "relayer", family)?,
		None => match family {
			ChainFamily::Evm => Identity::Evm(Address::repeat_byte(0x0e)),
			ChainFamily::Svm => Identity::Svm(Pubkey([0x0e; 32])),
		},
	};

	let mut oracle = MemoryOracle::new(verifier, relayer)?
		.with_chain_id(config_u64(config, "chain_id", DEFAULT_CHAIN_ID)?)
		.with_token_domain(
			config
				.get("token_name")
				.and_then(|v| v.as_str())
				.unwrap_or(DEFAULT_TOKEN_NAME),
			config
				.get("token_version")
				.and_then(|v| v.as_str())
				.map(str::to_string),
		);

	if let Some(balances) = config.get("balances").and_then(|v| v.as_array()) {
		for entry in balances {
			let holder = config_identity(entry, "holder", family)?;
			let asset = config_identity(entry, "asset", family)?;
			let amount = parse_decimal_u256("amount", config_str(entry, "amount")?)
				.map_err(|e| OracleError::Configuration(e.to_string()))?;
			oracle = oracle.with_balance(&holder, &asset, amount)?;
		}
	}

	Ok(Box::new(oracle))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = OracleFactory;

	fn factory() -> Self::Factory {
		create_oracle
	}
}

impl OracleRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::{Signer, SigningKey};
	use relay_message::gateway::encode_send;
	use relay_message::program::ed25519_verify_instruction;
	use relay_types::{ManualClock, SvmInstruction};

	const NOW: i64 = 1_800_000_000;
	const OWNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn evm_oracle(clock: Arc<ManualClock>) -> MemoryOracle {
		MemoryOracle::new(
			Identity::Evm(Address::repeat_byte(0x22)),
			Identity::Evm(Address::repeat_byte(0xee)),
		)
		.unwrap()
		.with_clock(clock)
	}

	fn evm_plan(oracle: &MemoryOracle, nonce: u64, deadline: i64) -> (Identity, ExecutionPlan) {
		let signer = relay_account::load_evm_key(&OWNER_KEY.into()).unwrap();
		let owner = Identity::Evm(signer.address());
		let params = PermitParameters::new(
			owner,
			oracle.verifier(),
			Identity::Evm(Address::repeat_byte(0x33)),
			U256::from(100u64),
			U256::from(5u64),
			deadline,
			U256::from(nonce),
		)
		.unwrap();
		let permit = relay_account::Eip712PermitSigner::new(signer, oracle.domain());
		let signed = relay_account::PermitSigner::sign(&permit, params).unwrap();
		let calldata = encode_send(
			&signed.parameters,
			&signed.signature,
			Address::repeat_byte(0x44),
		)
		.unwrap();
		(
			owner,
			ExecutionPlan::SingleCall(SingleCallPlan {
				chain_id: DEFAULT_CHAIN_ID,
				target: Address::repeat_byte(0x22),
				calldata,
			}),
		)
	}

	fn rejection(err: OracleError) -> RejectReason {
		match err {
			OracleError::Rejected { reason, .. } => reason,
			other => panic!("expected rejection, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_evm_settlement_and_replay() {
		let clock = Arc::new(ManualClock::new(NOW));
		let oracle = evm_oracle(clock);
		let asset = Identity::Evm(Address::repeat_byte(0x33));
		let (owner, plan) = evm_plan(&oracle, 0, NOW + 60);
		oracle.credit(&owner, &asset, U256::from(1_000u64)).await.unwrap();

		let reference = oracle.submit(&plan).await.unwrap();
		let receipt = oracle.wait_for_confirmation(&reference, 1).await.unwrap();
		assert!(receipt.success);
		assert_eq!(receipt.block_number, 1);

		assert_eq!(oracle.balance(&owner, &asset).await.unwrap(), U256::from(895u64));
		assert_eq!(
			oracle
				.balance(&Identity::Evm(Address::repeat_byte(0x44)), &asset)
				.await
				.unwrap(),
			U256::from(100u64)
		);
		assert_eq!(
			oracle.balance(&oracle.relayer(), &asset).await.unwrap(),
			U256::from(5u64)
		);
		assert_eq!(oracle.current_nonce(&owner, &asset).await.unwrap(), U256::from(1u8));
		assert!(oracle
			.is_nonce_consumed(&owner, &asset, U256::ZERO)
			.await
			.unwrap());

		// A consumed ERC-2612 nonce surfaces as a bad signature.
		let err = oracle.submit(&plan).await.unwrap_err();
		assert_eq!(rejection(err), RejectReason::InvalidSignature);
		assert_eq!(oracle.balance(&owner, &asset).await.unwrap(), U256::from(895u64));
	}

	#[tokio::test]
	async fn test_evm_expiry_and_funds() {
		let clock = Arc::new(ManualClock::new(NOW));
		let oracle = evm_oracle(clock.clone());
		let (owner, plan) = evm_plan(&oracle, 0, NOW);

		let err = oracle.submit(&plan).await.unwrap_err();
		assert_eq!(rejection(err), RejectReason::InsufficientFunds);

		oracle
			.credit(&owner, &Identity::Evm(Address::repeat_byte(0x33)), U256::from(105u64))
			.await
			.unwrap();
		clock.advance(1);
		let err = oracle.submit(&plan).await.unwrap_err();
		assert_eq!(rejection(err), RejectReason::Expired);

		clock.set(NOW);
		oracle.submit(&plan).await.unwrap();
	}

	#[tokio::test]
	async fn test_injected_failures_leave_state_untouched() {
		let oracle = evm_oracle(Arc::new(ManualClock::new(NOW)));
		let asset = Identity::Evm(Address::repeat_byte(0x33));
		let (owner, plan) = evm_plan(&oracle, 0, NOW + 60);
		oracle.credit(&owner, &asset, U256::from(105u64)).await.unwrap();

		oracle.fail_next_submissions(2);
		assert!(oracle.submit(&plan).await.unwrap_err().is_transient());
		assert!(oracle.submit(&plan).await.unwrap_err().is_transient());
		assert_eq!(oracle.current_nonce(&owner, &asset).await.unwrap(), U256::ZERO);
		oracle.submit(&plan).await.unwrap();
	}

	fn svm_plan(oracle: &MemoryOracle, key: &SigningKey, nonce: u64) -> ExecutionPlan {
		let program = oracle.verifier().svm("verifier").unwrap();
		let relayer = oracle.relayer().svm("relayer").unwrap();
		let owner = Pubkey(key.verifying_key().to_bytes());
		let mint = Pubkey([3u8; 32]);
		let params = PermitParameters::new(
			Identity::Svm(owner),
			oracle.verifier(),
			Identity::Svm(mint),
			U256::from(1_000u64),
			U256::from(10u64),
			NOW + 60,
			U256::from(nonce),
		)
		.unwrap();
		let message = FlatEncoder::message(&params).unwrap();
		let signature = key.sign(&message).to_bytes();
		let accounts =
			RelayedTransferAccounts::derive(&program, &owner, &mint, &Pubkey([4u8; 32]), &relayer)
				.unwrap();
		let args = RelayedTransferArgs {
			amount: 1_000,
			fee: 10,
			deadline: NOW + 60,
			sig_pubkey: owner,
			signature: signature.to_vec(),
			nonce,
		};
		ExecutionPlan::ComposedInstructions(ComposedInstructionPlan {
			fee_payer: relayer,
			instructions: vec![
				ed25519_verify_instruction(&owner, &signature, &message).unwrap(),
				SvmInstruction {
					program_id: program,
					accounts: accounts.to_metas(),
					data: args.encode(),
				},
			],
		})
	}

	#[tokio::test]
	async fn test_svm_settlement_and_watermark() {
		let oracle = MemoryOracle::new(
			Identity::Svm(Pubkey([9u8; 32])),
			Identity::Svm(Pubkey([8u8; 32])),
		)
		.unwrap()
		.with_clock(Arc::new(ManualClock::new(NOW)));
		let key = SigningKey::from_bytes(&[7u8; 32]);
		let owner = Identity::Svm(Pubkey(key.verifying_key().to_bytes()));
		let mint = Identity::Svm(Pubkey([3u8; 32]));
		oracle.credit(&owner, &mint, U256::from(5_000u64)).await.unwrap();

		assert_eq!(oracle.current_nonce(&owner, &mint).await.unwrap(), U256::from(1u8));
		oracle.submit(&svm_plan(&oracle, &key, 5)).await.unwrap();

		assert_eq!(oracle.balance(&owner, &mint).await.unwrap(), U256::from(3_990u64));
		assert_eq!(
			oracle
				.balance(&Identity::Svm(Pubkey([4u8; 32])), &mint)
				.await
				.unwrap(),
			U256::from(1_000u64)
		);
		assert_eq!(
			oracle.balance(&oracle.relayer(), &mint).await.unwrap(),
			U256::from(10u64)
		);

		for stale in [5, 3] {
			let err = oracle.submit(&svm_plan(&oracle, &key, stale)).await.unwrap_err();
			assert_eq!(rejection(err), RejectReason::NonceConsumed);
		}
		assert_eq!(oracle.current_nonce(&owner, &mint).await.unwrap(), U256::from(6u8));
	}

	#[tokio::test]
	async fn test_svm_rejects_tampered_signature() {
		let oracle = MemoryOracle::new(
			Identity::Svm(Pubkey([9u8; 32])),
			Identity::Svm(Pubkey([8u8; 32])),
		)
		.unwrap()
		.with_clock(Arc::new(ManualClock::new(NOW)));
		let key = SigningKey::from_bytes(&[7u8; 32]);
		let mut plan = svm_plan(&oracle, &key, 1);
		if let ExecutionPlan::ComposedInstructions(composed) = &mut plan {
			let last = composed.instructions[0].data.len() - 1;
			composed.instructions[0].data[last] ^= 1;
		}
		let err = oracle.submit(&plan).await.unwrap_err();
		assert_eq!(rejection(err), RejectReason::InvalidSignature);
	}

	#[test]
	fn test_factory() {
		let config: toml::Value = toml::from_str(
			r#"
			family = "evm"
			verifier = "0x2222222222222222222222222222222222222222"
			chain_id = 1
			token_name = "PayPal USD"
			balances = [
				{ holder = "0x1111111111111111111111111111111111111111", asset = "0x3333333333333333333333333333333333333333", amount = "1000" },
			]
			"#,
		)
		.unwrap();
		let oracle = create_oracle(&config).unwrap();
		assert_eq!(oracle.family(), ChainFamily::Evm);
		assert_eq!(oracle.chain_id(), Some(1));

		let bad: toml::Value = toml::from_str(
			r#"
			family = "svm"
			verifier = "0x2222222222222222222222222222222222222222"
			"#,
		)
		.unwrap();
		assert!(matches!(
			create_oracle(&bad),
			Err(OracleError::Configuration(_))
		));
	}
}
