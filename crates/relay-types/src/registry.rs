//! Registry trait for self-registering implementations.
//!
//! Oracle clients and storage backends each expose a `Registry` type that
//! names the configuration table it reads and the factory that builds it.

/// Base trait for implementation registries.
pub trait ImplementationRegistry {
	/// Key used under `[<section>.implementations.<NAME>]` in the config file,
	/// e.g. "evm_alloy" for oracle.implementations.evm_alloy.
	const NAME: &'static str;

	/// Factory function type for this kind of implementation.
	type Factory;

	/// Returns the factory that builds an instance from its config table.
	fn factory() -> Self::Factory;
}
