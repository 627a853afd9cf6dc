//! Chain-specific execution plans.
//!
//! The executor turns a permit into one of these and hands it to the oracle
//! client unchanged; retries resubmit the same plan.

use crate::{ChainFamily, Pubkey};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// What to submit for one permit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionPlan {
	/// One contract call (account model).
	SingleCall(SingleCallPlan),
	/// Ordered instructions executed atomically in one transaction (PDA model).
	ComposedInstructions(ComposedInstructionPlan),
}

impl ExecutionPlan {
	pub fn family(&self) -> ChainFamily {
		match self {
			ExecutionPlan::SingleCall(_) => ChainFamily::Evm,
			ExecutionPlan::ComposedInstructions(_) => ChainFamily::Svm,
		}
	}
}

/// A single call against the gateway contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleCallPlan {
	pub chain_id: u64,
	pub target: Address,
	#[serde(with = "hex::serde")]
	pub calldata: Vec<u8>,
}

/// Instructions that must land in one transaction, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedInstructionPlan {
	/// Account paying network fees and signing the transaction.
	pub fee_payer: Pubkey,
	pub instructions: Vec<SvmInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SvmInstruction {
	pub program_id: Pubkey,
	pub accounts: Vec<AccountMeta>,
	#[serde(with = "hex::serde")]
	pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
	pub pubkey: Pubkey,
	pub is_signer: bool,
	pub is_writable: bool,
}

impl AccountMeta {
	pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
		Self {
			pubkey,
			is_signer,
			is_writable: true,
		}
	}

	pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
		Self {
			pubkey,
			is_signer,
			is_writable: false,
		}
	}
}
