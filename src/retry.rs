use std::{fmt, sync::Arc, time::Duration};

use reqwest::StatusCode;

use crate::{Request, Response, TransportError};

/// Outcome of one transport attempt.
#[derive(Clone, Copy, Debug)]
pub enum RetryOutcome<'a> {
    Response(&'a Response),
    Error(&'a TransportError),
}

/// Context passed to retry predicates, delay functions and `on_retry`.
#[derive(Clone, Copy, Debug)]
pub struct RetryContext<'a> {
    /// Zero-based index of the attempt that just completed.
    pub attempt: u32,
    pub request: &'a Request,
    pub outcome: RetryOutcome<'a>,
}

impl<'a> RetryContext<'a> {
    pub fn response(&self) -> Option<&'a Response> {
        match self.outcome {
            RetryOutcome::Response(response) => Some(response),
            RetryOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&'a TransportError> {
        match self.outcome {
            RetryOutcome::Error(err) => Some(err),
            RetryOutcome::Response(_) => None,
        }
    }
}

pub type RetryWhen = Arc<dyn Fn(&RetryContext<'_>) -> bool + Send + Sync>;

/// Total number of transport invocations allowed for one call.
#[derive(Clone)]
pub enum Attempts {
    Fixed(u32),
    Dynamic(Arc<dyn Fn(&Request) -> u32 + Send + Sync>),
}

impl Attempts {
    /// Resolved count, never below one.
    pub fn resolve(&self, request: &Request) -> u32 {
        let attempts = match self {
            Self::Fixed(count) => *count,
            Self::Dynamic(attempts) => attempts(request),
        };
        attempts.max(1)
    }
}

impl fmt::Debug for Attempts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(count) => f.debug_tuple("Fixed").field(count).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

/// Wait before the next attempt.
#[derive(Clone)]
pub enum Delay {
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
    Dynamic(Arc<dyn Fn(&RetryContext<'_>) -> Duration + Send + Sync>),
}

impl Delay {
    pub fn resolve(&self, ctx: &RetryContext<'_>) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, max } => {
                let exp = ctx.attempt.min(16);
                let multiplier = 1u32 << exp;
                base.saturating_mul(multiplier).min(*max)
            }
            Self::Dynamic(delay) => delay(ctx),
        }
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Exponential { base, max } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

/// Configures retry behavior: how many attempts, how long to wait, and which
/// outcomes are eligible.
#[derive(Clone)]
pub struct RetryPolicy {
    pub attempts: Attempts,
    pub delay: Delay,
    pub when: RetryWhen,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: Attempts::Fixed(1),
            delay: Delay::Fixed(Duration::ZERO),
            when: Arc::new(default_retry_when),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("attempts", &self.attempts)
            .field("delay", &self.delay)
            .field("when", &"<fn>")
            .finish()
    }
}

impl RetryPolicy {
    /// Allows up to `attempts` transport invocations in total.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: Attempts::Fixed(attempts),
            ..Self::default()
        }
    }

    pub fn attempts_fn<F>(mut self, attempts: F) -> Self
    where
        F: Fn(&Request) -> u32 + Send + Sync + 'static,
    {
        self.attempts = Attempts::Dynamic(Arc::new(attempts));
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Delay::Fixed(delay);
        self
    }

    pub fn exponential(mut self, base: Duration, max: Duration) -> Self {
        self.delay = Delay::Exponential { base, max };
        self
    }

    pub fn delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(&RetryContext<'_>) -> Duration + Send + Sync + 'static,
    {
        self.delay = Delay::Dynamic(Arc::new(delay));
        self
    }

    pub fn when<F>(mut self, when: F) -> Self
    where
        F: Fn(&RetryContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.when = Arc::new(when);
        self
    }

    /// Decides whether the attempt described by `ctx` gets another try.
    pub(crate) fn should_retry(&self, max_attempts: u32, ctx: &RetryContext<'_>) -> bool {
        if ctx.attempt + 1 >= max_attempts {
            return false;
        }
        if ctx.error().is_some_and(TransportError::is_aborted) {
            return false;
        }
        (self.when)(ctx)
    }
}

/// Retries throttling and transient server statuses, timeouts and connect failures.
pub fn default_retry_when(ctx: &RetryContext<'_>) -> bool {
    match ctx.outcome {
        RetryOutcome::Response(response) => matches!(
            response.status,
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        ),
        RetryOutcome::Error(err) => err.is_timeout() || err.is_connect(),
    }
}
