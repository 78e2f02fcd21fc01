//! Heimdall - AI request gateway for feature services
//!
//! Every model call a product makes (CV parsing, keyword suggestion,
//! cover letters, embeddings, moderation, ...) goes through one
//! [`Gateway`]. The gateway screens the input, serves repeats from a TTL
//! cache, picks the provider and model for the task, waits for rate limit
//! admission, retries transient provider failures with exponential
//! backoff, screens the output and hands back a normalized [`Response`].
//!
//! Failures are data: [`Gateway::route`] always returns a `Response`, with
//! `ok == false` and a [`Failure`] when something went wrong.
//!
//! # Example
//!
//! ```rust,no_run
//! use heimdall::{Heimdall, Request, RouteOptions, Task};
//!
//! #[tokio::main]
//! async fn main() -> heimdall::Result<()> {
//!     let gateway = Heimdall::builder()
//!         .openai("sk-your-key")
//!         .build()?;
//!
//!     let response = gateway
//!         .route(
//!             &Request::new(Task::Generate)
//!                 .system("You are a concise assistant.")
//!                 .prompt("Say hello"),
//!             &RouteOptions::default(),
//!         )
//!         .await;
//!
//!     match response.text() {
//!         Some(text) => println!("{text}"),
//!         None => eprintln!("failed: {:?}", response.failure),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Custom providers
//!
//! Anything implementing [`providers::Provider`] can be registered with
//! [`HeimdallBuilder::provider`]; requests reach it when the resolved
//! [`ModelRef::provider`] matches its name.

pub mod cache;
pub mod config;
mod convert;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod safety;
pub mod settings;
pub mod telemetry;
pub mod traits;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::CacheConfig;
pub use config::Config;
pub use error::{HeimdallError, Result};
pub use gateway::{Gateway, Heimdall, HeimdallBuilder};
pub use providers::{OverflowPolicy, RateLimitConfig, RetryConfig};
pub use safety::{AllowAll, ClassifierPolicy, HeuristicPolicy, SafetyPolicy};
pub use settings::{Defaults, Settings, SettingsSource, SharedSettings};
pub use traits::RequestRouter;
pub use version::{PKG_VERSION, version_string};

// Re-export all types
pub use types::{
    Failure, ModelKind, ModelRef, Output, Request, Response, RetryOverride, RouteOptions,
    SafetyStage, SafetyVerdict, Task, TokenCost, Usage,
};
