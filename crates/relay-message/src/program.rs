//! Instruction codecs and address derivation for the PDA-model oracle.
//!
//! A relay is one transaction with two instructions, in this order:
//!
//! 1. a native ed25519 verification instruction over the flat permit message;
//! 2. the escrow program's `relayed_transfer`, which inspects instruction 0
//!    through the instructions sysvar, checks deadline and nonce, and moves
//!    `amount` to the receiver and `fee` to the relayer from the escrow.

use relay_types::{AccountMeta, EncodingError, Pubkey, SvmInstruction};
use solana_sdk::pubkey::Pubkey as SolanaPubkey;
use spl_associated_token_account_client::address::get_associated_token_address_with_program_id;

pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
	6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
	237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
	140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 219,
	3, 24, 224, 209, 148, 22, 92, 153, 120, 56, 89,
]);
pub const ED25519_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
	3, 125, 70, 214, 124, 147, 251, 190, 18, 249, 66, 143, 131, 141, 64, 255, 5, 112, 116, 73, 39,
	244, 138, 100, 252, 202, 112, 68, 128, 0, 0, 0,
]);
pub const SYSVAR_INSTRUCTIONS_ID: Pubkey = Pubkey::new_from_array([
	6, 167, 213, 23, 24, 123, 209, 102, 53, 218, 212, 4, 85, 253, 194, 192, 193, 36, 198, 143, 33,
	86, 117, 165, 219, 186, 203, 95, 8, 0, 0, 0,
]);

/// Anchor discriminator of `relayed_transfer`: sha256("global:relayed_transfer")[..8].
pub const RELAYED_TRANSFER_DISCRIMINATOR: [u8; 8] = [226, 64, 225, 4, 82, 52, 14, 190];

pub const ESCROW_SEED: &[u8] = b"escrow";
pub const STATE_SEED: &[u8] = b"state";

/// Custom error codes raised by the escrow program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramErrorCode {
	DeadlineExpired,
	InvalidNonce,
	SignatureMessageMismatch,
	SignaturePubkeyMismatch,
	OwnerPubkeyMismatch,
}

impl ProgramErrorCode {
	pub fn from_code(code: u32) -> Option<Self> {
		match code {
			6000 => Some(Self::DeadlineExpired),
			6001 => Some(Self::InvalidNonce),
			6002 => Some(Self::SignatureMessageMismatch),
			6003 => Some(Self::SignaturePubkeyMismatch),
			6004 => Some(Self::OwnerPubkeyMismatch),
			_ => None,
		}
	}

	pub fn code(&self) -> u32 {
		match self {
			Self::DeadlineExpired => 6000,
			Self::InvalidNonce => 6001,
			Self::SignatureMessageMismatch => 6002,
			Self::SignaturePubkeyMismatch => 6003,
			Self::OwnerPubkeyMismatch => 6004,
		}
	}
}

pub fn to_solana_pubkey(key: &Pubkey) -> SolanaPubkey {
	SolanaPubkey::new_from_array(key.to_bytes())
}

pub fn from_solana_pubkey(key: &SolanaPubkey) -> Pubkey {
	Pubkey(key.to_bytes())
}

/// Derives a program address and its bump seed.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> Option<(Pubkey, u8)> {
	SolanaPubkey::try_find_program_address(seeds, &to_solana_pubkey(program_id))
		.map(|(pda, bump)| (from_solana_pubkey(&pda), bump))
}

/// Escrow authority PDA for `(owner, mint)`.
pub fn escrow_authority(owner: &Pubkey, mint: &Pubkey, program_id: &Pubkey) -> Option<Pubkey> {
	find_program_address(&[ESCROW_SEED, owner.as_bytes(), mint.as_bytes()], program_id)
		.map(|(pda, _)| pda)
}

/// State PDA holding `last_nonce` for `(owner, mint)`.
pub fn state_address(owner: &Pubkey, mint: &Pubkey, program_id: &Pubkey) -> Option<Pubkey> {
	find_program_address(&[STATE_SEED, owner.as_bytes(), mint.as_bytes()], program_id)
		.map(|(pda, _)| pda)
}

/// Associated token account of `wallet` for `mint` under the classic token program.
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
	from_solana_pubkey(&get_associated_token_address_with_program_id(
		&to_solana_pubkey(wallet),
		&to_solana_pubkey(mint),
		&to_solana_pubkey(&TOKEN_PROGRAM_ID),
	))
}

const ED25519_HEADER_LEN: usize = 16;
const ED25519_PUBKEY_OFFSET: usize = ED25519_HEADER_LEN;
const ED25519_SIGNATURE_OFFSET: usize = ED25519_PUBKEY_OFFSET + 32;
const ED25519_MESSAGE_OFFSET: usize = ED25519_SIGNATURE_OFFSET + 64;
/// Instruction index meaning "this instruction".
const CURRENT_INSTRUCTION: u16 = u16::MAX;

/// Builds the native ed25519 verification instruction for one signature with
/// all data inline: header, public key, signature, message.
pub fn ed25519_verify_instruction(
	public_key: &Pubkey,
	signature: &[u8; 64],
	message: &[u8],
) -> Result<SvmInstruction, EncodingError> {
	let message_len = u16::try_from(message.len()).map_err(|_| EncodingError::OutOfRange {
		field: "message",
		width: "u16",
		value: message.len().to_string(),
	})?;

	let mut data = Vec::with_capacity(ED25519_MESSAGE_OFFSET + message.len());
	data.push(1); // signature count
	data.push(0); // padding
	for value in [
		ED25519_SIGNATURE_OFFSET as u16,
		CURRENT_INSTRUCTION,
		ED25519_PUBKEY_OFFSET as u16,
		CURRENT_INSTRUCTION,
		ED25519_MESSAGE_OFFSET as u16,
		message_len,
		CURRENT_INSTRUCTION,
	] {
		data.extend_from_slice(&value.to_le_bytes());
	}
	data.extend_from_slice(public_key.as_bytes());
	data.extend_from_slice(signature);
	data.extend_from_slice(message);

	Ok(SvmInstruction {
		program_id: ED25519_PROGRAM_ID,
		accounts: Vec::new(),
		data,
	})
}

/// Contents of a single-signature ed25519 verification instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed25519Payload {
	pub public_key: Pubkey,
	pub signature: [u8; 64],
	pub message: Vec<u8>,
}

/// Parses instruction data produced by [`ed25519_verify_instruction`] or any
/// single-signature instruction whose offsets point into itself.
pub fn parse_ed25519_instruction(data: &[u8]) -> Result<Ed25519Payload, EncodingError> {
	let invalid = |message: &str| EncodingError::InvalidValue {
		field: "ed25519_instruction",
		message: message.to_string(),
	};
	if data.len() < ED25519_HEADER_LEN || data[0] != 1 {
		return Err(invalid("expected exactly one signature"));
	}
	let read_u16 = |at: usize| u16::from_le_bytes([data[at], data[at + 1]]);
	let sig_offset = read_u16(2) as usize;
	let pk_offset = read_u16(6) as usize;
	let msg_offset = read_u16(10) as usize;
	let msg_len = read_u16(12) as usize;
	for index_at in [4, 8, 14] {
		if read_u16(index_at) != CURRENT_INSTRUCTION {
			return Err(invalid("data must be inline"));
		}
	}

	let slice = |offset: usize, len: usize| {
		data.get(offset..offset + len)
			.ok_or_else(|| invalid("offset out of bounds"))
	};
	let mut public_key = [0u8; 32];
	public_key.copy_from_slice(slice(pk_offset, 32)?);
	let mut signature = [0u8; 64];
	signature.copy_from_slice(slice(sig_offset, 64)?);
	Ok(Ed25519Payload {
		public_key: Pubkey(public_key),
		signature,
		message: slice(msg_offset, msg_len)?.to_vec(),
	})
}

/// Arguments of `relayed_transfer`, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedTransferArgs {
	pub amount: u64,
	pub fee: u64,
	pub deadline: i64,
	pub sig_pubkey: Pubkey,
	pub signature: Vec<u8>,
	pub nonce: u64,
}

impl RelayedTransferArgs {
	/// Discriminator followed by the borsh encoding of the arguments.
	pub fn encode(&self) -> Vec<u8> {
		let mut data = Vec::with_capacity(8 + 8 + 8 + 8 + 32 + 4 + self.signature.len() + 8);
		data.extend_from_slice(&RELAYED_TRANSFER_DISCRIMINATOR);
		data.extend_from_slice(&self.amount.to_le_bytes());
		data.extend_from_slice(&self.fee.to_le_bytes());
		data.extend_from_slice(&self.deadline.to_le_bytes());
		data.extend_from_slice(self.sig_pubkey.as_bytes());
		data.extend_from_slice(&(self.signature.len() as u32).to_le_bytes());
		data.extend_from_slice(&self.signature);
		data.extend_from_slice(&self.nonce.to_le_bytes());
		data
	}

	pub fn decode(data: &[u8]) -> Result<Self, EncodingError> {
		let mut reader = Reader::new(data);
		if reader.take::<8>()? != RELAYED_TRANSFER_DISCRIMINATOR {
			return Err(EncodingError::InvalidValue {
				field: "instruction_data",
				message: "not a relayed_transfer instruction".to_string(),
			});
		}
		let amount = u64::from_le_bytes(reader.take()?);
		let fee = u64::from_le_bytes(reader.take()?);
		let deadline = i64::from_le_bytes(reader.take()?);
		let sig_pubkey = Pubkey(reader.take()?);
		let sig_len = u32::from_le_bytes(reader.take()?) as usize;
		let signature = reader.slice(sig_len)?.to_vec();
		let nonce = u64::from_le_bytes(reader.take()?);
		Ok(Self {
			amount,
			fee,
			deadline,
			sig_pubkey,
			signature,
			nonce,
		})
	}
}

/// Accounts of `relayed_transfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayedTransferAccounts {
	pub relayer: Pubkey,
	pub mint: Pubkey,
	pub escrow_authority: Pubkey,
	pub escrow_token_account: Pubkey,
	pub receiver_token_account: Pubkey,
	pub relayer_token_account: Pubkey,
	pub state: Pubkey,
}

impl RelayedTransferAccounts {
	/// Derives every account from owner, mint, receiver wallet and relayer.
	pub fn derive(
		program_id: &Pubkey,
		owner: &Pubkey,
		mint: &Pubkey,
		receiver: &Pubkey,
		relayer: &Pubkey,
	) -> Result<Self, EncodingError> {
		let underivable = |what: &str| EncodingError::InvalidValue {
			field: "accounts",
			message: format!("no valid program address for {}", what),
		};
		let escrow_authority =
			escrow_authority(owner, mint, program_id).ok_or_else(|| underivable("escrow"))?;
		Ok(Self {
			relayer: *relayer,
			mint: *mint,
			escrow_authority,
			escrow_token_account: associated_token_address(&escrow_authority, mint),
			receiver_token_account: associated_token_address(receiver, mint),
			relayer_token_account: associated_token_address(relayer, mint),
			state: state_address(owner, mint, program_id).ok_or_else(|| underivable("state"))?,
		})
	}

	/// Account metas in the order the program declares them.
	pub fn to_metas(&self) -> Vec<AccountMeta> {
		vec![
			AccountMeta::new(self.relayer, true),
			AccountMeta::new_readonly(self.mint, false),
			AccountMeta::new_readonly(self.escrow_authority, false),
			AccountMeta::new(self.escrow_token_account, false),
			AccountMeta::new(self.receiver_token_account, false),
			AccountMeta::new(self.relayer_token_account, false),
			AccountMeta::new(self.state, false),
			AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
			AccountMeta::new_readonly(SYSVAR_INSTRUCTIONS_ID, false),
		]
	}

	/// Inverse of [`to_metas`](Self::to_metas).
	pub fn from_metas(metas: &[AccountMeta]) -> Result<Self, EncodingError> {
		if metas.len() != 9 {
			return Err(EncodingError::InvalidValue {
				field: "accounts",
				message: format!("relayed_transfer takes 9 accounts, got {}", metas.len()),
			});
		}
		Ok(Self {
			relayer: metas[0].pubkey,
			mint: metas[1].pubkey,
			escrow_authority: metas[2].pubkey,
			escrow_token_account: metas[3].pubkey,
			receiver_token_account: metas[4].pubkey,
			relayer_token_account: metas[5].pubkey,
			state: metas[6].pubkey,
		})
	}
}

/// Escrow state account contents after the 8-byte account discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowState {
	pub owner: Pubkey,
	pub mint: Pubkey,
	pub escrow: Pubkey,
	pub last_nonce: u64,
	pub bump: u8,
}

impl EscrowState {
	pub const LEN: usize = 8 + 32 + 32 + 32 + 8 + 1;

	pub fn decode(data: &[u8]) -> Result<Self, EncodingError> {
		let mut reader = Reader::new(data);
		reader.take::<8>()?;
		Ok(Self {
			owner: Pubkey(reader.take()?),
			mint: Pubkey(reader.take()?),
			escrow: Pubkey(reader.take()?),
			last_nonce: u64::from_le_bytes(reader.take()?),
			bump: reader.take::<1>()?[0],
		})
	}
}

struct Reader<'a> {
	data: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(data: &'a [u8]) -> Self {
		Self { data, pos: 0 }
	}

	fn slice(&mut self, len: usize) -> Result<&'a [u8], EncodingError> {
		let out = self
			.data
			.get(self.pos..self.pos + len)
			.ok_or_else(|| EncodingError::InvalidValue {
				field: "instruction_data",
				message: format!("truncated at byte {}", self.pos),
			})?;
		self.pos += len;
		Ok(out)
	}

	fn take<const N: usize>(&mut self) -> Result<[u8; N], EncodingError> {
		let mut out = [0u8; N];
		out.copy_from_slice(self.slice(N)?);
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use solana_sdk::hash::hash;

	#[test]
	fn test_discriminator() {
		let digest = hash(b"global:relayed_transfer");
		assert_eq!(&digest.to_bytes()[..8], &RELAYED_TRANSFER_DISCRIMINATOR);
	}

	#[test]
	fn test_well_known_ids() {
		assert_eq!(
			TOKEN_PROGRAM_ID.to_string(),
			"TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
		);
		assert_eq!(
			ASSOCIATED_TOKEN_PROGRAM_ID.to_string(),
			"ATokenGPvbdGVxr1b2hvZbsiqW5xWJ25efTNsLJA8knL"
		);
		assert_eq!(
			ED25519_PROGRAM_ID.to_string(),
			"Ed25519SigVerify111111111111111111111111111"
		);
		assert_eq!(
			SYSVAR_INSTRUCTIONS_ID.to_string(),
			"Sysvar1nstructions1111111111111111111111111"
		);
	}

	#[test]
	fn test_program_address_is_off_curve_and_stable() {
		let program = Pubkey([5u8; 32]);
		let owner = Pubkey([1u8; 32]);
		let mint = Pubkey([2u8; 32]);
		let (pda, bump) =
			find_program_address(&[ESCROW_SEED, owner.as_bytes(), mint.as_bytes()], &program)
				.unwrap();
		assert!(!to_solana_pubkey(&pda).is_on_curve());
		assert_eq!(escrow_authority(&owner, &mint, &program), Some(pda));
		assert_ne!(state_address(&owner, &mint, &program), Some(pda));

		let recreated = SolanaPubkey::create_program_address(
			&[ESCROW_SEED, owner.as_bytes(), mint.as_bytes(), &[bump]],
			&to_solana_pubkey(&program),
		)
		.unwrap();
		assert_eq!(from_solana_pubkey(&recreated), pda);
	}

	#[test]
	fn test_associated_token_address_matches_program_derivation() {
		let wallet = Pubkey([1u8; 32]);
		let mint = Pubkey([2u8; 32]);
		let (expected, _) = find_program_address(
			&[wallet.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
			&ASSOCIATED_TOKEN_PROGRAM_ID,
		)
		.unwrap();
		assert_eq!(associated_token_address(&wallet, &mint), expected);
		assert_eq!(
			to_solana_pubkey(&ASSOCIATED_TOKEN_PROGRAM_ID),
			spl_associated_token_account_client::program::id()
		);
		assert_eq!(to_solana_pubkey(&ED25519_PROGRAM_ID), solana_sdk::ed25519_program::id());
		assert_eq!(
			to_solana_pubkey(&SYSVAR_INSTRUCTIONS_ID),
			solana_sdk::sysvar::instructions::id()
		);
	}

	#[test]
	fn test_ed25519_instruction_layout() {
		let pk = Pubkey([9u8; 32]);
		let sig = [4u8; 64];
		let msg = vec![1u8; crate::flat::MESSAGE_LEN];
		let ix = ed25519_verify_instruction(&pk, &sig, &msg).unwrap();
		assert_eq!(ix.program_id, ED25519_PROGRAM_ID);
		assert!(ix.accounts.is_empty());
		assert_eq!(ix.data.len(), 16 + 32 + 64 + 110);
		assert_eq!(&ix.data[..2], &[1, 0]);
		assert_eq!(u16::from_le_bytes([ix.data[2], ix.data[3]]), 48);
		assert_eq!(u16::from_le_bytes([ix.data[6], ix.data[7]]), 16);
		assert_eq!(u16::from_le_bytes([ix.data[10], ix.data[11]]), 112);
		assert_eq!(u16::from_le_bytes([ix.data[12], ix.data[13]]), 110);

		let parsed = parse_ed25519_instruction(&ix.data).unwrap();
		assert_eq!(parsed.public_key, pk);
		assert_eq!(parsed.signature, sig);
		assert_eq!(parsed.message, msg);

		assert!(parse_ed25519_instruction(&ix.data[..100]).is_err());
	}

	#[test]
	fn test_relayed_transfer_args() {
		let args = RelayedTransferArgs {
			amount: 1_000,
			fee: 10,
			deadline: 1_900_000_000,
			sig_pubkey: Pubkey([3u8; 32]),
			signature: vec![8u8; 64],
			nonce: 77,
		};
		let data = args.encode();
		assert_eq!(data.len(), 8 + 8 + 8 + 8 + 32 + 4 + 64 + 8);
		assert_eq!(&data[..8], &RELAYED_TRANSFER_DISCRIMINATOR);
		assert_eq!(RelayedTransferArgs::decode(&data).unwrap(), args);
		assert!(RelayedTransferArgs::decode(&data[..40]).is_err());
	}

	#[test]
	fn test_escrow_state_decode() {
		let mut data = vec![0u8; 8];
		data.extend_from_slice(&[1u8; 32]);
		data.extend_from_slice(&[2u8; 32]);
		data.extend_from_slice(&[3u8; 32]);
		data.extend_from_slice(&41u64.to_le_bytes());
		data.push(254);
		assert_eq!(data.len(), EscrowState::LEN);

		let state = EscrowState::decode(&data).unwrap();
		assert_eq!(state.owner, Pubkey([1u8; 32]));
		assert_eq!(state.last_nonce, 41);
		assert_eq!(state.bump, 254);
	}

	#[test]
	fn test_account_order() {
		let accounts = RelayedTransferAccounts::derive(
			&Pubkey([5u8; 32]),
			&Pubkey([1u8; 32]),
			&Pubkey([2u8; 32]),
			&Pubkey([3u8; 32]),
			&Pubkey([4u8; 32]),
		)
		.unwrap();
		let metas = accounts.to_metas();
		assert_eq!(metas.len(), 9);
		assert!(metas[0].is_signer && metas[0].is_writable);
		assert!(metas[1..].iter().all(|m| !m.is_signer));
		assert_eq!(metas[8].pubkey, SYSVAR_INSTRUCTIONS_ID);
		assert_eq!(RelayedTransferAccounts::from_metas(&metas).unwrap(), accounts);
	}
}
