use std::{fmt, sync::Arc, time::Duration};

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{
    options::Resolved, retry::RetryOutcome, FetchError, Issue, Options, Payload, Request,
    Response, ResponseError, Result, RetryContext, SerdeSchema, StandardSchema, Transport,
    TransportError, ValidationError,
};

type DefaultsFn = Arc<dyn Fn(&str, &Options) -> Options + Send + Sync>;

/// Creates a request function over `transport`.
///
/// `defaults` runs on every call with the call's input and per-call options,
/// so defaults may depend on the target.
///
/// # Example
///
/// ```no_run
/// use upfetch::{up, Options};
///
/// let fetch = up(reqwest::Client::new(), |_input, _options| {
///     Options::new()
///         .base_url("https://api.example.com")
///         .bearer_auth("my-token")
/// });
/// ```
pub fn up<T, F>(transport: T, defaults: F) -> UpFetch
where
    T: Transport + 'static,
    F: Fn(&str, &Options) -> Options + Send + Sync + 'static,
{
    UpFetch::new(transport).with_defaults_fn(defaults)
}

#[derive(Clone)]
/// Configurable request function: merges options, executes through the
/// transport, retries, rejects, parses and validates.
pub struct UpFetch {
    transport: Arc<dyn Transport>,
    defaults: DefaultsFn,
}

impl fmt::Debug for UpFetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpFetch")
            .field("transport", &"<transport>")
            .field("defaults", &"<fn>")
            .finish()
    }
}

impl UpFetch {
    /// Creates a request function with empty defaults.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            defaults: Arc::new(|_, _| Options::default()),
        }
    }

    /// Uses a fixed set of default options.
    pub fn with_defaults(self, defaults: Options) -> Self {
        self.with_defaults_fn(move |_, _| defaults.clone())
    }

    /// Computes default options per call.
    pub fn with_defaults_fn<F>(mut self, defaults: F) -> Self
    where
        F: Fn(&str, &Options) -> Options + Send + Sync + 'static,
    {
        self.defaults = Arc::new(defaults);
        self
    }

    /// Fetches `input` and returns the parsed body.
    pub async fn fetch(&self, input: &str, options: Options) -> Result<Payload> {
        self.pipeline(input, options, |payload, _, _| Ok(payload.clone())).await
    }

    /// Fetches `input` and validates the parsed body against `schema`.
    ///
    /// Schema issues surface as [`FetchError::Validation`].
    pub async fn fetch_with<S>(
        &self,
        input: &str,
        options: Options,
        schema: &S,
    ) -> Result<S::Output>
    where
        S: StandardSchema + ?Sized,
    {
        self.pipeline(input, options, |payload, request, response| {
            schema
                .validate(payload)
                .map_err(|issues| validation_error(issues, payload, request, response))
        })
        .await
    }

    /// Fetches `input` and deserializes the parsed body into `T`.
    pub async fn fetch_json<T: DeserializeOwned>(&self, input: &str, options: Options) -> Result<T> {
        self.fetch_with(input, options, &SerdeSchema::<T>::new()).await
    }

    async fn pipeline<T, V>(&self, input: &str, options: Options, validate: V) -> Result<T>
    where
        V: FnOnce(&Payload, &Request, &Response) -> Result<T>,
    {
        let defaults = (self.defaults)(input, &options);
        let resolved = Options::resolve(defaults, options);
        let request = resolved.build_request(input)?;

        let outcome = match self.run(&resolved, &request).await {
            Ok((payload, response)) => {
                validate(&payload, &request, &response).map(|output| (output, payload))
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok((output, payload)) => {
                if let Some(on_success) = &resolved.on_success {
                    on_success(&payload, &request);
                }
                Ok(output)
            }
            Err(err) => {
                if let Some(on_error) = &resolved.on_error {
                    on_error(&err, &request);
                }
                Err(err)
            }
        }
    }

    async fn run(&self, resolved: &Resolved, request: &Request) -> Result<(Payload, Response)> {
        let response = self.send_with_retry(resolved, request).await?;

        if (resolved.reject)(&response) {
            #[cfg(feature = "tracing")]
            tracing::debug!(status = %response.status, url = %request.url, "response rejected");

            let data = (resolved.parse_rejected)(&response, request)?;
            return Err(ResponseError::new(data, response, request.clone()).into());
        }

        let payload = (resolved.parse_response)(&response, request)?;
        Ok((payload, response))
    }

    async fn send_with_retry(
        &self,
        resolved: &Resolved,
        request: &Request,
    ) -> std::result::Result<Response, TransportError> {
        let max_attempts = resolved.retry.attempts.resolve(request);
        let mut attempt = 0u32;
        loop {
            if let Some(on_request) = &resolved.on_request {
                on_request(request);
            }

            let result = self.send_once(resolved, request.clone()).await;

            let retry_delay = {
                let outcome = match &result {
                    Ok(response) => RetryOutcome::Response(response),
                    Err(err) => RetryOutcome::Error(err),
                };
                let ctx = RetryContext {
                    attempt,
                    request,
                    outcome,
                };
                if resolved.retry.should_retry(max_attempts, &ctx) {
                    let delay = resolved.retry.delay.resolve(&ctx);
                    if let Some(on_retry) = &resolved.on_retry {
                        on_retry(&ctx);
                    }
                    Some(delay)
                } else {
                    None
                }
            };

            let Some(delay) = retry_delay else {
                return result;
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                url = %request.url,
                "retrying request"
            );

            wait_before_retry(delay, resolved.signal.as_ref()).await?;
            attempt += 1;
        }
    }

    /// Runs one transport call, raced against the timeout and the cancellation token.
    async fn send_once(
        &self,
        resolved: &Resolved,
        request: Request,
    ) -> std::result::Result<Response, TransportError> {
        let send = async {
            match resolved.timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.transport.send(request))
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Timeout(timeout))),
                None => self.transport.send(request).await,
            }
        };

        match &resolved.signal {
            Some(signal) => {
                if signal.is_cancelled() {
                    return Err(TransportError::Aborted);
                }
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => Err(TransportError::Aborted),
                    result = send => result,
                }
            }
            None => send.await,
        }
    }
}

async fn wait_before_retry(
    delay: Duration,
    signal: Option<&CancellationToken>,
) -> std::result::Result<(), TransportError> {
    match signal {
        Some(signal) => tokio::select! {
            biased;
            _ = signal.cancelled() => Err(TransportError::Aborted),
            _ = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

fn validation_error(
    issues: Vec<Issue>,
    payload: &Payload,
    request: &Request,
    response: &Response,
) -> FetchError {
    #[cfg(feature = "tracing")]
    tracing::debug!(issues = issues.len(), url = %request.url, "response failed validation");

    ValidationError {
        issues,
        data: payload.clone(),
        response: response.clone(),
        request: request.clone(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::UpFetch;
    use crate::{transport_fn, Options, Response};

    #[test]
    fn debug_hides_transport_and_defaults() {
        let fetch = UpFetch::new(transport_fn(|_| async {
            Ok(Response::new(StatusCode::OK))
        }))
        .with_defaults(Options::new().bearer_auth("secret-token"));
        let debug = format!("{fetch:?}");
        assert!(debug.contains("UpFetch"));
        assert!(!debug.contains("secret-token"));
    }
}
