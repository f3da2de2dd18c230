//! Provider-facing types.
//!
//! Providers are reached only through [`ProviderInvoker`]; the orchestrator
//! uses the request's provider name solely to select a circuit breaker.

pub mod traits;

pub use traits::{
    FnInvoker, InvocationParameters, InvocationRequest, ProviderInvoker, ProviderOutput,
    invoker_fn,
};
