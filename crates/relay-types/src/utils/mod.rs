//! Utility functions for encoding, formatting and time.
//!
//! Helpers shared by the encoders, the wire record and the service adapters.

pub mod clock;
pub mod conversion;
pub mod eip712;
pub mod formatting;
pub mod helpers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conversion::{decode_signature, parse_decimal_u256, u256_to_u64};
pub use eip712::{
	compute_domain_hash, compute_final_digest, Eip712AbiEncoder, DEFAULT_DOMAIN_VERSION,
	DOMAIN_TYPE, PERMIT_TYPE,
};
pub use formatting::{
	format_token_amount, parse_token_amount, truncate_id, with_0x_prefix, without_0x_prefix,
};
pub use helpers::current_timestamp;
