//! ABI of the account-model oracle: the gasless gateway and the ERC-2612 token.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{sol, SolCall};
use relay_types::{EncodingError, PermitParameters, PermitSignature};

sol! {
	/// Gateway entry point: consumes the permit on `token` with spender =
	/// gateway, then moves `amount` to `receiver` and `fee` to the caller.
	function send(
		address token,
		address sender,
		address receiver,
		uint256 amount,
		uint256 fee,
		uint256 deadline,
		uint8 v,
		bytes32 r,
		bytes32 s
	) external;

	function nonces(address owner) external view returns (uint256);
	function balanceOf(address account) external view returns (uint256);
	function name() external view returns (string);
	function version() external view returns (string);
	function decimals() external view returns (uint8);
}

/// Decoded arguments of a gateway `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendArgs {
	pub token: Address,
	pub sender: Address,
	pub receiver: Address,
	pub amount: U256,
	pub fee: U256,
	pub deadline: U256,
	pub v: u8,
	pub r: B256,
	pub s: B256,
}

impl SendArgs {
	/// Rebuilds the 65-byte `r || s || v` signature.
	pub fn signature(&self) -> PermitSignature {
		let mut bytes = Vec::with_capacity(65);
		bytes.extend_from_slice(self.r.as_slice());
		bytes.extend_from_slice(self.s.as_slice());
		bytes.push(self.v);
		PermitSignature::new(bytes)
	}
}

/// ABI-encodes the `send` call for a permit and receiver.
pub fn encode_send(
	params: &PermitParameters,
	signature: &PermitSignature,
	receiver: Address,
) -> Result<Vec<u8>, EncodingError> {
	if params.deadline < 0 {
		return Err(EncodingError::OutOfRange {
			field: "deadline",
			width: "uint256",
			value: params.deadline.to_string(),
		});
	}
	params.total()?;
	let (r, s, v) = signature.split_rsv()?;
	let call = sendCall {
		token: params.asset.evm("asset")?,
		sender: params.owner.evm("owner")?,
		receiver,
		amount: params.amount,
		fee: params.fee,
		deadline: U256::from(params.deadline as u64),
		v,
		r,
		s,
	};
	Ok(call.abi_encode())
}

/// Decodes `send` calldata.
pub fn decode_send(calldata: &[u8]) -> Result<SendArgs, EncodingError> {
	let call = sendCall::abi_decode(calldata, true).map_err(|e| EncodingError::InvalidValue {
		field: "calldata",
		message: e.to_string(),
	})?;
	Ok(SendArgs {
		token: call.token,
		sender: call.sender,
		receiver: call.receiver,
		amount: call.amount,
		fee: call.fee,
		deadline: call.deadline,
		v: call.v,
		r: call.r,
		s: call.s,
	})
}
