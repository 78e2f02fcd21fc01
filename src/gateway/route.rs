//! The gateway orchestrator.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::selector;
use super::single_flight::SingleFlight;
use crate::cache::{Fingerprint, TtlCache};
use crate::convert;
use crate::providers::{Payload, Provider, RateLimiter, RetryConfig, with_retry};
use crate::safety::SafetyPolicy;
use crate::settings::{Settings, SettingsSource};
use crate::telemetry;
use crate::types::{
    Failure, ModelRef, Output, Request, Response, RouteOptions, SafetyStage, Task, Usage,
};
use crate::{HeimdallError, Result};

/// The single entry point feature services send model requests through.
///
/// Cheap to clone; clones share providers, cache, rate limits and the
/// in-flight registry. Build one with [`Heimdall::builder()`](crate::Heimdall::builder).
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) providers: HashMap<String, Arc<dyn Provider>>,
    pub(super) settings: Arc<dyn SettingsSource>,
    pub(super) safety: Arc<dyn SafetyPolicy>,
    pub(super) cache: TtlCache<Fingerprint, Response>,
    pub(super) limiter: RateLimiter,
    pub(super) flights: SingleFlight<Fingerprint, Response>,
    pub(super) shutdown: CancellationToken,
}

impl Gateway {
    pub(super) fn from_inner(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Route a request to its provider and return a normalized response.
    ///
    /// Never fails: safety rejections, provider errors, timeouts and rate
    /// limit refusals all come back as a [`Response`] with `ok == false` and
    /// a [`Failure`](crate::Failure) describing what happened.
    #[instrument(skip_all, fields(task = %request.task))]
    pub async fn route(&self, request: &Request, options: &RouteOptions) -> Response {
        let start = Instant::now();
        let response = self.route_inner(request, options).await;
        record_request(request.task, &response, start);
        response
    }

    async fn route_inner(&self, request: &Request, options: &RouteOptions) -> Response {
        if self.inner.shutdown.is_cancelled() {
            return Response::failed(&HeimdallError::Cancelled, None);
        }
        let settings = self.inner.settings.settings();

        if settings.enable_safety {
            let verdict = self.inner.safety.pre_check(request).await;
            if !verdict.allowed {
                debug!(policy = self.inner.safety.name(), flags = ?verdict.flags, "input blocked");
                record_safety_block(SafetyStage::Pre);
                return Response::blocked(SafetyStage::Pre, verdict, None);
            }
        }

        let cacheable = options.allow_cache && settings.enable_cache && request.task.is_cacheable();
        if !cacheable {
            return self.inner.dispatch(request, options, &settings, None).await;
        }

        let key = Fingerprint::of(request);
        if let Some(hit) = self.inner.cache.get(&key).await {
            debug!(fingerprint = %key, "cache hit");
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "task" => request.task.as_str())
                .increment(1);
            return hit.into_cached();
        }
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "task" => request.task.as_str())
            .increment(1);

        let inner = Arc::clone(&self.inner);
        let request_owned = request.clone();
        let options_owned = options.clone();
        let work = async move {
            inner
                .dispatch(&request_owned, &options_owned, &settings, Some(key))
                .await
        };
        let (response, joined) = self.inner.flights.run(key, work).await;
        if joined {
            debug!(fingerprint = %key, "joined in-flight request");
            metrics::counter!(telemetry::INFLIGHT_JOINS_TOTAL, "task" => request.task.as_str())
                .increment(1);
        }
        response
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Number of cached responses, expired ones not yet reclaimed included.
    pub async fn cache_len(&self) -> u64 {
        self.inner.cache.len().await
    }

    /// Tokens left in `provider`'s rate limit bucket.
    ///
    /// `None` until the provider has been called at least once.
    pub fn remaining_tokens(&self, provider: &str) -> Option<u32> {
        self.inner.limiter.remaining(provider)
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Settings {
        self.inner.settings.settings()
    }

    /// Ids of the registered providers, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Cancel every in-flight provider call.
    ///
    /// Pending and future routes return [`Failure::Cancelled`](crate::Failure::Cancelled).
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Inner {
    /// Select, admit, invoke, normalize, screen and (maybe) cache.
    async fn dispatch(
        &self,
        request: &Request,
        options: &RouteOptions,
        settings: &Settings,
        cache_key: Option<Fingerprint>,
    ) -> Response {
        let model = selector::resolve(settings, request.task, options.force_provider.as_deref());
        match self.invoke(request, options, settings, &model).await {
            Ok((output, usage)) => {
                if settings.enable_safety {
                    if let Some(text) = output.screenable_text() {
                        let verdict = self.safety.post_check(&text).await;
                        if !verdict.allowed {
                            debug!(
                                policy = self.safety.name(),
                                flags = ?verdict.flags,
                                "output blocked"
                            );
                            record_safety_block(SafetyStage::Post);
                            return Response::blocked(SafetyStage::Post, verdict, Some(&model));
                        }
                    }
                }
                let response = Response::success(&model, output, usage);
                if let Some(key) = cache_key {
                    let ttl = options.cache_ttl.unwrap_or(settings.cache_ttl);
                    self.cache.set(key, response.clone(), ttl).await;
                }
                response
            }
            Err(e) => {
                warn!(
                    provider = %model.provider,
                    model = %model.model,
                    error = %e,
                    "request failed"
                );
                Response::failed(&e, Some(&model))
            }
        }
    }

    async fn invoke(
        &self,
        request: &Request,
        options: &RouteOptions,
        settings: &Settings,
        model: &ModelRef,
    ) -> Result<(Output, Option<Usage>)> {
        let provider = self
            .providers
            .get(&model.provider)
            .cloned()
            .ok_or_else(|| HeimdallError::NoProvider(model.provider.clone()))?;

        let waited = self
            .until_shutdown(self.limiter.acquire(&model.provider))
            .await?;
        if !waited.is_zero() {
            debug!(
                provider = %model.provider,
                waited_ms = waited.as_millis() as u64,
                "admitted after wait"
            );
        }

        let retry = match options.retry {
            Some(retry) => RetryConfig::from(retry),
            None => RetryConfig::new()
                .max_attempts(settings.defaults.retry_attempts)
                .initial_delay(settings.defaults.backoff),
        };
        let timeout = options.timeout.unwrap_or(settings.defaults.timeout);
        let payload = Payload::from_request(request, &settings.defaults);

        let attempts = with_retry(&retry, &model.provider, request.task.as_str(), || {
            self.attempt(provider.as_ref(), model, &payload, timeout)
        });
        self.until_shutdown(attempts).await
    }

    /// One provider call, bounded by `timeout` and normalized.
    ///
    /// The call gets a child of the shutdown token, cancelled on timeout.
    async fn attempt(
        &self,
        provider: &dyn Provider,
        model: &ModelRef,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<(Output, Option<Usage>)> {
        let cancel = self.shutdown.child_token();
        let raw = tokio::select! {
            result = provider.invoke(model, payload, &cancel) => result?,
            _ = tokio::time::sleep(timeout) => {
                cancel.cancel();
                return Err(HeimdallError::Timeout { after: timeout });
            }
        };

        if let Some(usage) = raw.usage {
            record_token_usage(&model.provider, usage.input_tokens, usage.output_tokens);
        }
        let usage = convert::to_usage(raw.usage, model);
        let output = convert::to_output(payload.task, raw, payload.texts.len())?;
        Ok((output, usage))
    }

    /// Run `fut` unless the gateway shuts down first.
    async fn until_shutdown<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            result = fut => result,
            _ = self.shutdown.cancelled() => Err(HeimdallError::Cancelled),
        }
    }
}

fn record_request(task: Task, response: &Response, start: Instant) {
    let status = if response.ok {
        "ok"
    } else if response.failure.is_none()
        || matches!(response.failure, Some(Failure::SafetyBlocked { .. }))
    {
        "blocked"
    } else {
        "error"
    };
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "task" => task.as_str(),
        "status" => status,
        "cached" => if response.cached { "true" } else { "false" },
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "task" => task.as_str())
        .record(start.elapsed().as_secs_f64());
}

fn record_safety_block(stage: SafetyStage) {
    metrics::counter!(telemetry::SAFETY_BLOCKS_TOTAL, "stage" => stage.as_str()).increment(1);
}

fn record_token_usage(provider: &str, input: u32, output: u32) {
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "input",
    )
    .increment(u64::from(input));
    metrics::counter!(telemetry::TOKENS_TOTAL,
        "provider" => provider.to_owned(),
        "direction" => "output",
    )
    .increment(u64::from(output));
}
