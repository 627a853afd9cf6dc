//! Execution plan construction.
//!
//! EVM: one `send` call on the gateway. SVM: the native ed25519 verification
//! at index 0 followed by `relayed_transfer`, which reads the verification
//! back through the instructions sysvar.

use crate::RelayError;
use relay_message::{
	gateway::encode_send,
	program::{ed25519_verify_instruction, RelayedTransferAccounts, RelayedTransferArgs},
	FlatEncoder,
};
use relay_oracle::OracleInterface;
use relay_types::{
	ChainFamily, ComposedInstructionPlan, ExecutionPlan, Identity, SignedPermit, SingleCallPlan,
	SvmInstruction,
};

/// Builds the plan that settles `permit` to `receiver` on `oracle`'s deployment.
pub fn build_plan(
	permit: &SignedPermit,
	receiver: &Identity,
	oracle: &dyn OracleInterface,
) -> Result<ExecutionPlan, RelayError> {
	match oracle.family() {
		ChainFamily::Evm => single_call(permit, receiver, oracle).map(ExecutionPlan::SingleCall),
		ChainFamily::Svm => {
			composed_instructions(permit, receiver, oracle).map(ExecutionPlan::ComposedInstructions)
		},
	}
}

fn single_call(
	permit: &SignedPermit,
	receiver: &Identity,
	oracle: &dyn OracleInterface,
) -> Result<SingleCallPlan, RelayError> {
	let chain_id = oracle.chain_id().ok_or_else(|| {
		RelayError::Encoding("account-model oracle reports no chain id".to_string())
	})?;
	let calldata = encode_send(
		&permit.parameters,
		&permit.signature,
		receiver.evm("receiver")?,
	)?;
	Ok(SingleCallPlan {
		chain_id,
		target: oracle.verifier().evm("verifier")?,
		calldata,
	})
}

fn composed_instructions(
	permit: &SignedPermit,
	receiver: &Identity,
	oracle: &dyn OracleInterface,
) -> Result<ComposedInstructionPlan, RelayError> {
	let params = &permit.parameters;
	let program = oracle.verifier().svm("verifier")?;
	let relayer = oracle.relayer().svm("relayer")?;
	let owner = params.owner.svm("owner")?;
	let mint = params.asset.svm("asset")?;

	let message = FlatEncoder::message(params)?;
	let amounts = FlatEncoder::amounts(params)?;
	let signature = permit.signature.ed25519_bytes()?;

	let verify = ed25519_verify_instruction(&owner, &signature, &message)?;
	let accounts = RelayedTransferAccounts::derive(
		&program,
		&owner,
		&mint,
		&receiver.svm("receiver")?,
		&relayer,
	)?;
	let args = RelayedTransferArgs {
		amount: amounts.amount,
		fee: amounts.fee,
		deadline: amounts.deadline,
		sig_pubkey: owner,
		signature: signature.to_vec(),
		nonce: amounts.nonce,
	};

	Ok(ComposedInstructionPlan {
		fee_payer: relayer,
		instructions: vec![
			verify,
			SvmInstruction {
				program_id: program,
				accounts: accounts.to_metas(),
				data: args.encode(),
			},
		],
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{Address, U256};
	use ed25519_dalek::SigningKey;
	use relay_account::{Ed25519PermitSigner, PermitSigner};
	use relay_message::gateway::decode_send;
	use relay_message::program::{parse_ed25519_instruction, ED25519_PROGRAM_ID};
	use relay_oracle::implementations::memory::MemoryOracle;
	use relay_types::{PermitParameters, PermitSignature, Pubkey};

	#[test]
	fn test_evm_plan_targets_gateway() {
		let gateway = Identity::Evm(Address::repeat_byte(0x22));
		let oracle = MemoryOracle::new(gateway, Identity::Evm(Address::repeat_byte(0xee)))
			.unwrap()
			.with_chain_id(8453);
		let params = PermitParameters::new(
			Identity::Evm(Address::repeat_byte(1)),
			gateway,
			Identity::Evm(Address::repeat_byte(3)),
			U256::from(10u64),
			U256::from(1u64),
			1_900_000_000,
			U256::from(7u64),
		)
		.unwrap();
		let mut sig = vec![0x11; 64];
		sig.push(27);
		let permit = SignedPermit::new(
			params,
			PermitSignature::new(sig),
			Identity::Evm(Address::repeat_byte(1)),
		)
		.unwrap();

		let receiver = Identity::Evm(Address::repeat_byte(4));
		let ExecutionPlan::SingleCall(plan) = build_plan(&permit, &receiver, &oracle).unwrap() else {
			panic!("expected a single call");
		};
		assert_eq!(plan.chain_id, 8453);
		assert_eq!(plan.target, Address::repeat_byte(0x22));
		let args = decode_send(&plan.calldata).unwrap();
		assert_eq!(args.receiver, Address::repeat_byte(4));
		assert_eq!(args.amount, U256::from(10u64));
		assert_eq!(args.v, 27);
	}

	#[test]
	fn test_svm_plan_orders_verification_first() {
		let program = Pubkey([9u8; 32]);
		let relayer = Pubkey([0x0e; 32]);
		let oracle = MemoryOracle::new(Identity::Svm(program), Identity::Svm(relayer)).unwrap();
		let signer = Ed25519PermitSigner::new(SigningKey::from_bytes(&[5u8; 32]));
		let params = PermitParameters::new(
			signer.identity(),
			Identity::Svm(program),
			Identity::Svm(Pubkey([3u8; 32])),
			U256::from(1_000u64),
			U256::from(10u64),
			1_900_000_000,
			U256::from(42u64),
		)
		.unwrap();
		let permit = signer.sign(params).unwrap();

		let ExecutionPlan::ComposedInstructions(plan) =
			build_plan(&permit, &Identity::Svm(Pubkey([4u8; 32])), &oracle).unwrap()
		else {
			panic!("expected composed instructions");
		};
		assert_eq!(plan.fee_payer, relayer);
		assert_eq!(plan.instructions.len(), 2);
		assert_eq!(plan.instructions[0].program_id, ED25519_PROGRAM_ID);
		assert_eq!(plan.instructions[1].program_id, program);

		let payload = parse_ed25519_instruction(&plan.instructions[0].data).unwrap();
		assert_eq!(payload.public_key, signer.pubkey());
		assert_eq!(payload.message, FlatEncoder::message(&permit.parameters).unwrap());

		let args = RelayedTransferArgs::decode(&plan.instructions[1].data).unwrap();
		assert_eq!(args.nonce, 42);
		assert_eq!(args.sig_pubkey, signer.pubkey());
		let accounts = RelayedTransferAccounts::from_metas(&plan.instructions[1].accounts).unwrap();
		assert_eq!(accounts.relayer, relayer);
	}

	#[test]
	fn test_svm_plan_rejects_wide_amounts() {
		let program = Pubkey([9u8; 32]);
		let oracle =
			MemoryOracle::new(Identity::Svm(program), Identity::Svm(Pubkey([0x0e; 32]))).unwrap();
		let signer = Ed25519PermitSigner::new(SigningKey::from_bytes(&[5u8; 32]));
		let params = PermitParameters::new(
			signer.identity(),
			Identity::Svm(program),
			Identity::Svm(Pubkey([3u8; 32])),
			U256::from(u64::MAX),
			U256::from(1u64),
			1_900_000_000,
			U256::from(1u64),
		)
		.unwrap();
		let permit = SignedPermit::new(
			params,
			PermitSignature::new(vec![0u8; 64]),
			signer.identity(),
		)
		.unwrap();

		let err = build_plan(&permit, &Identity::Svm(Pubkey([4u8; 32])), &oracle).unwrap_err();
		assert!(matches!(err, RelayError::Encoding(_)));
	}
}
