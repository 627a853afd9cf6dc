//! Common types for the gasless permit relay.
//!
//! This crate defines the data model shared by the signer, the permit store,
//! the oracle clients and the relayer executor: chain identities, permit
//! parameters, the JSON wire record, execution plans and receipts.

/// HTTP request and response types for the relay endpoint.
pub mod api;
/// Encoding errors raised while building or parsing permits.
pub mod error;
/// Chain families and account identities.
pub mod identity;
/// Permit parameters and signed permits.
pub mod permit;
/// Chain-specific execution plans.
pub mod plan;
/// Settlement references and receipts.
pub mod receipt;
/// JSON wire record crossing the signer/relayer boundary.
pub mod record;
/// Self-registration trait for pluggable implementations.
pub mod registry;
/// Redacting wrapper for key material and API keys.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Encoding helpers, formatting and time utilities.
pub mod utils;

pub use api::*;
pub use error::EncodingError;
pub use identity::{ChainFamily, Identity, Pubkey};
pub use permit::{PermitId, PermitParameters, PermitSignature, SignedPermit};
pub use plan::{
	AccountMeta, ComposedInstructionPlan, ExecutionPlan, SingleCallPlan, SvmInstruction,
};
pub use receipt::{
	ExecutionReceipt, RelayErrorKind, RelayStatus, SettlementReference, TransactionReceipt,
};
pub use record::PermitRecord;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::StorageKey;
pub use utils::{
	current_timestamp, format_token_amount, parse_token_amount, truncate_id, with_0x_prefix,
	without_0x_prefix, Clock, ManualClock, SystemClock,
};
