//! The provider invocation seam.
//!
//! Vordr never talks to a vendor API itself. Callers hand the orchestrator
//! a [`ProviderInvoker`] per call; adapters translating
//! [`InvocationRequest`] into a concrete SDK call live outside this crate.
//!
//! # Cancellation
//!
//! Invokers receive the caller's `CancellationToken`. The orchestrator
//! already races the invocation against the token and the preset timeout,
//! so honouring the token inside an invoker is only needed to release
//! resources early (e.g. abort an HTTP request).

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Sampling parameters sent with a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationParameters {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    /// Provider-specific parameters passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

/// Everything a provider needs for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub parameters: InvocationParameters,
}

/// Raw provider response with token accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOutput {
    pub content: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

impl ProviderOutput {
    pub fn new(content: impl Into<String>, tokens_in: u64, tokens_out: u64) -> Self {
        Self {
            content: content.into(),
            tokens_in,
            tokens_out,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

/// Calls a model provider.
///
/// Return `Err(VordrError::Provider(..))` for transport or vendor failures;
/// every error counts against the provider's circuit breaker.
#[async_trait]
pub trait ProviderInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: &InvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput>;
}

#[async_trait]
impl<T: ProviderInvoker + ?Sized> ProviderInvoker for Arc<T> {
    async fn invoke(
        &self,
        request: &InvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput> {
        (**self).invoke(request, cancel).await
    }
}

/// [`ProviderInvoker`] backed by an async closure. See [`invoker_fn`].
pub struct FnInvoker<F> {
    f: F,
}

/// Adapt an async closure into a [`ProviderInvoker`].
///
/// The closure receives owned copies of the request and token.
///
/// ```rust
/// use vordr::providers::{ProviderOutput, invoker_fn};
///
/// let echo = invoker_fn(|request, _cancel| async move {
///     Ok(ProviderOutput::new(request.prompt, 3, 3))
/// });
/// ```
pub fn invoker_fn<F, Fut>(f: F) -> FnInvoker<F>
where
    F: Fn(InvocationRequest, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderOutput>> + Send,
{
    FnInvoker { f }
}

#[async_trait]
impl<F, Fut> ProviderInvoker for FnInvoker<F>
where
    F: Fn(InvocationRequest, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderOutput>> + Send,
{
    async fn invoke(
        &self,
        request: &InvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<ProviderOutput> {
        (self.f)(request.clone(), cancel.clone()).await
    }
}

impl<F> std::fmt::Debug for FnInvoker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnInvoker").finish_non_exhaustive()
    }
}
