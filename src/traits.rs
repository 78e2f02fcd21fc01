//! Core RequestRouter trait

use async_trait::async_trait;

use crate::{Gateway, Request, Response, RouteOptions};

/// What feature services depend on.
///
/// Object safe, so services can hold an `Arc<dyn RequestRouter>` and tests
/// can swap in a stub without standing up providers.
#[async_trait]
pub trait RequestRouter: Send + Sync {
    /// Route a request and return a normalized response. Never fails.
    async fn route(&self, request: &Request, options: &RouteOptions) -> Response;

    /// Route with default options.
    async fn route_default(&self, request: &Request) -> Response {
        self.route(request, &RouteOptions::default()).await
    }
}

#[async_trait]
impl RequestRouter for Gateway {
    async fn route(&self, request: &Request, options: &RouteOptions) -> Response {
        Gateway::route(self, request, options).await
    }
}
