//! Legacy transaction assembly for composed instruction plans.
//!
//! The relayer is the fee payer and the only signer; plans that need any
//! other signature are refused before anything is sent.

use crate::OracleError;
use ed25519_dalek::SigningKey;
use relay_message::program::to_solana_pubkey;
use relay_types::{ComposedInstructionPlan, SvmInstruction};
use solana_sdk::{
	hash::Hash,
	instruction::{AccountMeta, Instruction},
	message::Message,
	signature::{keypair_from_seed, Keypair, Signature, Signer},
	transaction::Transaction,
};
use std::collections::HashSet;

pub fn to_instruction(ix: &SvmInstruction) -> Instruction {
	Instruction {
		program_id: to_solana_pubkey(&ix.program_id),
		accounts: ix
			.accounts
			.iter()
			.map(|meta| AccountMeta {
				pubkey: to_solana_pubkey(&meta.pubkey),
				is_signer: meta.is_signer,
				is_writable: meta.is_writable,
			})
			.collect(),
		data: ix.data.clone(),
	}
}

/// Converts the relayer's ed25519 key into a Solana keypair.
pub fn relayer_keypair(key: &SigningKey) -> Result<Keypair, OracleError> {
	keypair_from_seed(key.as_bytes())
		.map_err(|e| OracleError::Configuration(format!("invalid relayer key: {}", e)))
}

pub fn signature_bytes(signature: &Signature) -> [u8; 64] {
	let mut out = [0u8; 64];
	out.copy_from_slice(signature.as_ref());
	out
}

/// Compiles `plan` against `recent_blockhash` and signs it as the fee payer.
pub fn sign_transaction(
	plan: &ComposedInstructionPlan,
	recent_blockhash: Hash,
	payer: &Keypair,
) -> Result<Transaction, OracleError> {
	let fee_payer = to_solana_pubkey(&plan.fee_payer);
	if fee_payer != payer.pubkey() {
		return Err(OracleError::Configuration(format!(
			"plan fee payer {} is not the relayer key",
			plan.fee_payer
		)));
	}

	let mut keys = HashSet::from([plan.fee_payer]);
	for ix in &plan.instructions {
		keys.insert(ix.program_id);
		keys.extend(ix.accounts.iter().map(|meta| meta.pubkey));
	}
	if keys.len() > usize::from(u8::MAX) {
		return Err(OracleError::Configuration(format!(
			"transaction references {} accounts",
			keys.len()
		)));
	}

	let instructions: Vec<Instruction> = plan.instructions.iter().map(to_instruction).collect();
	let message = Message::new_with_blockhash(&instructions, Some(&fee_payer), &recent_blockhash);
	if message.header.num_required_signatures != 1 {
		return Err(OracleError::Configuration(format!(
			"plan requires {} signers, only the fee payer can sign",
			message.header.num_required_signatures
		)));
	}

	let mut tx = Transaction::new_unsigned(message);
	tx.try_sign(&[payer], recent_blockhash)
		.map_err(|e| OracleError::Configuration(format!("failed to sign transaction: {}", e)))?;
	Ok(tx)
}
