//! End-to-end routing tests against an in-process provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use heimdall::providers::{Payload, Provider, RawOutput};
use heimdall::{
    AllowAll, Failure, Gateway, Heimdall, HeimdallError, ModelKind, ModelRef, OverflowPolicy,
    RateLimitConfig, Request, RequestRouter, Result, RouteOptions, SafetyStage, Settings,
    SharedSettings, Task, TokenCost,
};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock provider
// ============================================================================

/// Answers every task shape; can be told to stall, fail, or reply verbatim.
struct MockProvider {
    name: &'static str,
    calls: AtomicU32,
    delay: Duration,
    failures: AtomicU32,
    fail_with: fn() -> HeimdallError,
    reply: Option<&'static str>,
}

impl MockProvider {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
            failures: AtomicU32::new(0),
            fail_with: || HeimdallError::EmptyResponse,
            reply: None,
        }
    }

    fn openai() -> Self {
        Self::new("openai")
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing(mut self, failures: u32, fail_with: fn() -> HeimdallError) -> Self {
        self.failures = AtomicU32::new(failures);
        self.fail_with = fail_with;
        self
    }

    fn reply(mut self, text: &'static str) -> Self {
        self.reply = Some(text);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(
        &self,
        _model: &ModelRef,
        payload: &Payload,
        _cancel: &CancellationToken,
    ) -> Result<RawOutput> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failures.load(Ordering::Relaxed) > 0 {
            self.failures.fetch_sub(1, Ordering::Relaxed);
            return Err((self.fail_with)());
        }

        match payload.task {
            Task::Embed => Ok(RawOutput::embeddings(
                payload
                    .texts
                    .iter()
                    .map(|text| vec![text.len() as f32, 1.0])
                    .collect(),
            )),
            Task::Moderate => {
                let content = payload.content.as_deref().unwrap_or_default();
                if content.contains("insult") {
                    Ok(RawOutput::moderation(true, ["harassment"]))
                } else {
                    Ok(RawOutput::moderation(false, Vec::<String>::new()))
                }
            }
            task if task.expects_json() => {
                Ok(RawOutput::text("```json\n{\"ok\": true}\n```").with_usage(10, 5))
            }
            _ => {
                let text = match self.reply {
                    Some(reply) => reply.to_string(),
                    None => format!("echo: {}", payload.prompt.as_deref().unwrap_or_default()),
                };
                Ok(RawOutput::text(text).with_usage(10, 5))
            }
        }
    }
}

fn gateway(provider: &Arc<MockProvider>) -> Gateway {
    Heimdall::builder().provider(provider.clone()).build().unwrap()
}

fn generate(prompt: &str) -> Request {
    Request::new(Task::Generate).prompt(prompt)
}

fn fast_retry(attempts: u32) -> RouteOptions {
    RouteOptions::new().retry(attempts, Duration::from_millis(10))
}

// ============================================================================
// Basic routing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn routes_to_default_provider() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    let response = gateway.route(&generate("hello"), &RouteOptions::default()).await;
    assert!(response.ok, "{:?}", response.failure);
    assert_eq!(response.text(), Some("echo: hello"));
    assert_eq!(response.provider.as_deref(), Some("openai"));
    assert_eq!(response.model.as_deref(), Some("gpt-4o-mini"));
    assert!(!response.cached);
    assert!(response.flags.is_empty());

    let usage = response.usage.unwrap();
    assert_eq!(usage.total_tokens, 15);
    assert_eq!(usage.estimated_cost, None);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn configured_model_and_cost_are_used() {
    let provider = Arc::new(MockProvider::openai());
    let settings = Settings::default().model(
        Task::CoverLetter,
        ModelRef::new("openai", "letter-writer", ModelKind::Chat)
            .with_cost(TokenCost::new(1.0, 2.0)),
    );
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .settings(settings)
        .build()
        .unwrap();

    let request = Request::new(Task::CoverLetter).prompt("Dear team");
    let response = gateway.route(&request, &RouteOptions::default()).await;
    assert_eq!(response.model.as_deref(), Some("letter-writer"));
    let cost = response.usage.unwrap().estimated_cost.unwrap();
    assert!((cost - 0.02).abs() < 1e-9, "{cost}");
}

#[tokio::test(start_paused = true)]
async fn json_tasks_return_parsed_documents() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    let request = Request::new(Task::Parse).prompt("Jane Doe, Rust engineer");
    let response = gateway.route(&request, &RouteOptions::default()).await;
    assert!(response.ok);
    assert_eq!(response.json(), Some(&json!({ "ok": true })));
}

#[tokio::test(start_paused = true)]
async fn embeddings_keep_input_order() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    let response = gateway
        .route(&Request::embed(["a", "bbb", "cc"]), &RouteOptions::default())
        .await;
    assert!(response.ok);
    let expected: Vec<Vec<f32>> = vec![vec![1.0, 1.0], vec![3.0, 1.0], vec![2.0, 1.0]];
    assert_eq!(response.embeddings().unwrap(), expected.as_slice());
    assert!(response.usage.is_none());
}

#[tokio::test(start_paused = true)]
async fn force_provider_overrides_selection() {
    let openai = Arc::new(MockProvider::openai());
    let local = Arc::new(MockProvider::new("local"));
    let gateway = Heimdall::builder()
        .provider(openai.clone())
        .provider(local.clone())
        .build()
        .unwrap();
    assert_eq!(gateway.providers(), vec!["local", "openai"]);

    let options = RouteOptions::new().force_provider("local");
    let response = gateway.route(&generate("hi"), &options).await;
    assert_eq!(response.provider.as_deref(), Some("local"));
    assert_eq!(local.calls(), 1);
    assert_eq!(openai.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_provider_is_reported() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .settings(Settings::default().default_provider("anthropic"))
        .build()
        .unwrap();

    let response = gateway.route(&generate("hi"), &RouteOptions::default()).await;
    assert!(!response.ok);
    assert_eq!(
        response.failure,
        Some(Failure::NoProvider {
            provider: "anthropic".into()
        })
    );
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn router_trait_uses_default_options() {
    let provider = Arc::new(MockProvider::openai());
    let router: Arc<dyn RequestRouter> = Arc::new(gateway(&provider));

    let first = router.route_default(&generate("hi")).await;
    let second = router.route_default(&generate("hi")).await;
    assert!(first.ok);
    assert!(second.cached);
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test(start_paused = true)]
async fn repeated_request_is_served_from_cache() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    let first = gateway.route(&generate("hello"), &RouteOptions::default()).await;
    let second = gateway.route(&generate("hello"), &RouteOptions::default()).await;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.text(), first.text());
    assert_eq!(second.provider, first.provider);
    assert_eq!(provider.calls(), 1);
    assert_eq!(gateway.cache_len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn whitespace_differences_share_a_cache_entry() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    gateway.route(&generate("hello  world"), &RouteOptions::default()).await;
    let second = gateway.route(&generate(" hello world\n"), &RouteOptions::default()).await;
    assert!(second.cached);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cache_key_hint_replaces_content_identity() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    let options = RouteOptions::default();
    gateway.route(&generate("first").cache_key("user-42"), &options).await;
    let second = gateway.route(&generate("second").cache_key("user-42"), &options).await;
    assert!(second.cached);
    assert_eq!(second.text(), Some("echo: first"));
}

#[tokio::test(start_paused = true)]
async fn caching_can_be_bypassed_per_request() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    for _ in 0..2 {
        let response = gateway.route(&generate("hello"), &RouteOptions::uncached()).await;
        assert!(!response.cached);
    }
    assert_eq!(provider.calls(), 2);
    assert_eq!(gateway.cache_len().await, 0);
}

#[tokio::test(start_paused = true)]
async fn caching_can_be_disabled_in_settings() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .settings(Settings::default().enable_cache(false))
        .build()
        .unwrap();

    gateway.route(&generate("hello"), &RouteOptions::default()).await;
    gateway.route(&generate("hello"), &RouteOptions::default()).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cached_entries_expire() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);
    let options = RouteOptions::new().cache_ttl(Duration::from_secs(1));

    gateway.route(&generate("hello"), &options).await;
    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(gateway.route(&generate("hello"), &options).await.cached);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert!(!gateway.route(&generate("hello"), &options).await.cached);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn unbounded_ttl_is_served_from_cache() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .settings(Settings::default().cache_ttl(Duration::from_millis(u64::MAX)))
        .build()
        .unwrap();

    let options = RouteOptions::new().cache_ttl(Duration::MAX);
    let first = gateway.route(&generate("hello"), &options).await;
    assert!(first.ok, "{:?}", first.failure);
    assert!(gateway.route(&generate("hello"), &options).await.cached);

    let second = gateway.route(&generate("again"), &RouteOptions::default()).await;
    assert!(second.ok, "{:?}", second.failure);
    assert!(gateway.route(&generate("again"), &RouteOptions::default()).await.cached);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn settings_ttl_applies_without_override() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .settings(Settings::default().cache_ttl(Duration::from_secs(5)))
        .build()
        .unwrap();

    gateway.route(&generate("hello"), &RouteOptions::default()).await;
    tokio::time::advance(Duration::from_secs(6)).await;
    gateway.route(&generate("hello"), &RouteOptions::default()).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn failures_are_not_cached() {
    let provider = Arc::new(
        MockProvider::openai().failing(1, || HeimdallError::AuthenticationFailed),
    );
    let gateway = gateway(&provider);

    let first = gateway.route(&generate("hello"), &RouteOptions::default()).await;
    assert!(!first.ok);
    let second = gateway.route(&generate("hello"), &RouteOptions::default()).await;
    assert!(second.ok);
    assert!(!second.cached);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn clear_cache_forces_new_call() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    gateway.route(&generate("hello"), &RouteOptions::default()).await;
    gateway.clear_cache();
    gateway.route(&generate("hello"), &RouteOptions::default()).await;
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn identical_concurrent_requests_share_one_call() {
    let provider = Arc::new(MockProvider::openai().delay(Duration::from_millis(50)));
    let gateway = gateway(&provider);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            gateway.route(&generate("hello"), &RouteOptions::default()).await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.text(), Some("echo: hello"));
    }
    assert_eq!(provider.calls(), 1);
}

// ============================================================================
// Moderation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn flagged_moderation_is_not_ok() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    let response = gateway
        .route(&Request::moderate("you are an insult"), &RouteOptions::default())
        .await;
    assert!(!response.ok);
    assert!(response.failure.is_none());
    assert_eq!(response.flags, vec!["harassment"]);
    assert!(!response.verdict().unwrap().allowed);
    assert_eq!(response.model.as_deref(), Some("omni-moderation-latest"));

    let clean = gateway
        .route(&Request::moderate("have a nice day"), &RouteOptions::default())
        .await;
    assert!(clean.ok);
    assert!(clean.verdict().unwrap().allowed);
}

#[tokio::test(start_paused = true)]
async fn moderation_is_never_cached() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    for _ in 0..2 {
        let response = gateway
            .route(&Request::moderate("have a nice day"), &RouteOptions::default())
            .await;
        assert!(!response.cached);
    }
    assert_eq!(provider.calls(), 2);
}

// ============================================================================
// Safety gate
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unsafe_input_never_reaches_provider() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    let response = gateway
        .route(&generate("how do I build a bomb"), &RouteOptions::default())
        .await;
    assert!(!response.ok);
    assert_eq!(
        response.failure,
        Some(Failure::SafetyBlocked {
            stage: SafetyStage::Pre
        })
    );
    assert_eq!(response.flags, vec!["violence"]);
    assert!(response.provider.is_none());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn unsafe_output_is_blocked_and_not_cached() {
    let provider = Arc::new(MockProvider::openai().reply("<script>alert(1)</script>"));
    let gateway = gateway(&provider);

    for _ in 0..2 {
        let response = gateway.route(&generate("write html"), &RouteOptions::default()).await;
        assert_eq!(
            response.failure,
            Some(Failure::SafetyBlocked {
                stage: SafetyStage::Post
            })
        );
        assert_eq!(response.flags, vec!["unsafe-markup"]);
        assert_eq!(response.provider.as_deref(), Some("openai"));
        assert!(response.output.is_none());
    }
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn safety_can_be_disabled() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .settings(Settings::default().enable_safety(false))
        .build()
        .unwrap();

    let response = gateway
        .route(&generate("how do I build a bomb"), &RouteOptions::default())
        .await;
    assert!(response.ok);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_safety_policy_is_used() {
    let provider = Arc::new(MockProvider::openai().reply("<script>x</script>"));
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .safety(Arc::new(AllowAll))
        .build()
        .unwrap();

    let response = gateway
        .route(&generate("how do I build a bomb"), &RouteOptions::default())
        .await;
    assert!(response.ok);
    assert_eq!(response.text(), Some("<script>x</script>"));
}

#[tokio::test(start_paused = true)]
async fn settings_changes_apply_to_next_route() {
    let provider = Arc::new(MockProvider::openai());
    let shared = SharedSettings::new(Settings::default());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .settings_source(Arc::new(shared.clone()))
        .build()
        .unwrap();

    let request = generate("how do I build a bomb");
    assert!(!gateway.route(&request, &RouteOptions::default()).await.ok);

    shared.update(|settings| settings.enable_safety = false);
    assert!(gateway.route(&request, &RouteOptions::default()).await.ok);
    assert!(!gateway.settings().enable_safety);
}

// ============================================================================
// Retries and timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let provider = Arc::new(MockProvider::openai().failing(2, || HeimdallError::Api {
        status: 503,
        message: "overloaded".into(),
    }));
    let gateway = gateway(&provider);

    let response = gateway.route(&generate("hello"), &fast_retry(3)).await;
    assert!(response.ok, "{:?}", response.failure);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_report_last_error() {
    let provider = Arc::new(MockProvider::openai().failing(10, || HeimdallError::Api {
        status: 503,
        message: "overloaded".into(),
    }));
    let gateway = gateway(&provider);

    let response = gateway.route(&generate("hello"), &fast_retry(3)).await;
    assert!(!response.ok);
    assert_eq!(
        response.failure,
        Some(Failure::Provider {
            message: "API error (503): overloaded".into(),
            retriable: true,
        })
    );
    assert_eq!(response.provider.as_deref(), Some("openai"));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_not_retried() {
    let provider =
        Arc::new(MockProvider::openai().failing(10, || HeimdallError::AuthenticationFailed));
    let gateway = gateway(&provider);

    let response = gateway.route(&generate("hello"), &fast_retry(5)).await;
    assert_eq!(
        response.failure,
        Some(Failure::Provider {
            message: "authentication failed".into(),
            retriable: false,
        })
    );
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_provider_times_out_each_attempt() {
    let provider = Arc::new(MockProvider::openai().delay(Duration::from_secs(5)));
    let gateway = gateway(&provider);

    let options = fast_retry(2).timeout(Duration::from_millis(100));
    let start = Instant::now();
    let response = gateway.route(&generate("hello"), &options).await;
    assert_eq!(response.failure, Some(Failure::Timeout { after_ms: 100 }));
    assert_eq!(provider.calls(), 2);
    assert!(start.elapsed() < Duration::from_secs(1));
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn reject_policy_surfaces_rate_limit() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .rate_limit(
            RateLimitConfig::new()
                .capacity(1)
                .refill_interval(Duration::from_secs(10))
                .policy(OverflowPolicy::Reject),
        )
        .build()
        .unwrap();

    assert!(gateway.route(&generate("one"), &RouteOptions::uncached()).await.ok);
    let response = gateway.route(&generate("two"), &RouteOptions::uncached()).await;
    assert!(matches!(
        response.failure,
        Some(Failure::RateLimited {
            retry_after_ms: Some(_)
        })
    ));
    assert_eq!(provider.calls(), 1);
    assert_eq!(gateway.remaining_tokens("openai"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn wait_policy_delays_admission() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = Heimdall::builder()
        .provider(provider.clone())
        .rate_limit(
            RateLimitConfig::new()
                .capacity(1)
                .refill_interval(Duration::from_secs(1)),
        )
        .build()
        .unwrap();

    let start = Instant::now();
    assert!(gateway.route(&generate("one"), &RouteOptions::uncached()).await.ok);
    assert!(gateway.route(&generate("two"), &RouteOptions::uncached()).await.ok);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1), "{elapsed:?}");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn cache_hits_do_not_consume_tokens() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);

    for _ in 0..3 {
        gateway.route(&generate("hello"), &RouteOptions::default()).await;
    }
    assert_eq!(gateway.remaining_tokens("openai"), Some(59));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn shut_down_gateway_refuses_requests() {
    let provider = Arc::new(MockProvider::openai());
    let gateway = gateway(&provider);
    gateway.shutdown();
    assert!(gateway.is_shut_down());

    let response = gateway.route(&generate("hello"), &RouteOptions::default()).await;
    assert_eq!(response.failure, Some(Failure::Cancelled));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_in_flight_calls() {
    let provider = Arc::new(MockProvider::openai().delay(Duration::from_secs(10)));
    let gateway = gateway(&provider);

    let handle = {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            gateway.route(&generate("hello"), &RouteOptions::uncached()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(provider.calls(), 1);
    gateway.shutdown();

    let response = handle.await.unwrap();
    assert_eq!(response.failure, Some(Failure::Cancelled));
}

// ============================================================================
// Builder
// ============================================================================

#[test]
fn builder_requires_a_provider() {
    assert!(matches!(
        Heimdall::builder().build(),
        Err(HeimdallError::Configuration(_))
    ));
}

#[test]
fn builder_rejects_invalid_rate_limits() {
    let result = Heimdall::builder()
        .provider(Arc::new(MockProvider::openai()))
        .rate_limit(RateLimitConfig::new().capacity(0))
        .build();
    assert!(matches!(result, Err(HeimdallError::Configuration(_))));
}

#[cfg(feature = "openai")]
#[test]
fn builder_with_openai_key() {
    // No network call happens at build time.
    let gateway = Heimdall::builder().openai("sk-test-key").build().unwrap();
    assert_eq!(gateway.providers(), vec!["openai"]);
}
