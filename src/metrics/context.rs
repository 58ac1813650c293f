//! Per-request context store.
//!
//! Every instrumented request runs inside its own [`RequestContext`], held in
//! a tokio task-local. Handlers read and write token usage through the free
//! functions below; concurrent requests never observe each other's values.
//!
//! The task-local is only visible to the task polling the request future.
//! Work spawned onto other tasks must carry the handle explicitly:
//!
//! ```rust,ignore
//! let ctx = RequestContext::current().expect("inside a request");
//! tokio::spawn(async move {
//!     ctx.add_token_usage(12, 40);
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{MetricsError, Result};

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Token counts attributed to a single request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Usage with `total_tokens` derived from input and output
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens == 0
    }
}

#[derive(Debug)]
struct ContextState {
    started: Instant,
    token_usage: TokenUsage,
}

/// Handle to the state of one in-flight request
#[derive(Debug, Clone)]
pub struct RequestContext {
    state: Arc<Mutex<ContextState>>,
}

impl RequestContext {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ContextState {
                started: Instant::now(),
                token_usage: TokenUsage::default(),
            })),
        }
    }

    /// Run `fut` inside a fresh context, returning the context alongside the output
    pub async fn scope<F>(fut: F) -> (F::Output, RequestContext)
    where
        F: Future,
    {
        let ctx = Self::new();
        let output = REQUEST_CONTEXT.scope(ctx.clone(), fut).await;
        (output, ctx)
    }

    /// Handle to the context of the request running on this task, if any
    pub fn current() -> Option<RequestContext> {
        REQUEST_CONTEXT.try_with(Clone::clone).ok()
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().started.elapsed()
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.lock().token_usage
    }

    pub fn set_token_usage(&self, usage: TokenUsage) {
        self.lock().token_usage = usage;
    }

    /// Accumulate usage on top of what the request already recorded
    pub fn add_token_usage(&self, input_tokens: u64, output_tokens: u64) {
        let mut state = self.lock();
        let added = TokenUsage::new(input_tokens, output_tokens);
        let usage = &mut state.token_usage;
        usage.input_tokens = usage.input_tokens.saturating_add(added.input_tokens);
        usage.output_tokens = usage.output_tokens.saturating_add(added.output_tokens);
        usage.total_tokens = usage.total_tokens.saturating_add(added.total_tokens);
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        // The state is plain data, a poisoned lock still holds a usable value.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Token usage of the current request, zero outside of a request
pub fn token_usage() -> TokenUsage {
    REQUEST_CONTEXT
        .try_with(RequestContext::token_usage)
        .unwrap_or_default()
}

/// Replace the token usage of the current request
pub fn set_token_usage(usage: TokenUsage) -> Result<()> {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.set_token_usage(usage))
        .map_err(|_| MetricsError::NoRequestContext)
}

/// Add to the token usage of the current request
pub fn add_token_usage(input_tokens: u64, output_tokens: u64) -> Result<()> {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.add_token_usage(input_tokens, output_tokens))
        .map_err(|_| MetricsError::NoRequestContext)
}
