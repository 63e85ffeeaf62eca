//! Writes the merged rate limit state as headers onto every response.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use axum::body::Body;
use http::{Request, Response};
use rate_limit::{RateLimitHeaders, RequestLimitState};
use tower::Layer;

/// Writes `x-ratelimit-*` headers from the merged state of the response.
///
/// Must wrap every rate limit layer of the router.
#[derive(Clone, Copy, Default)]
pub struct RateLimitHeadersLayer;

impl<Service> Layer<Service> for RateLimitHeadersLayer {
    type Service = RateLimitHeadersService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RateLimitHeadersService { next }
    }
}

/// Service created by [`RateLimitHeadersLayer`].
#[derive(Clone)]
pub struct RateLimitHeadersService<Service> {
    next: Service,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RateLimitHeadersService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let future = self.next.call(req);

        Box::pin(async move {
            let mut response = future.await?;

            let limit = response
                .extensions()
                .get::<RequestLimitState>()
                .and_then(RequestLimitState::limit);

            // Non-conformant results already travel with the rejection.
            if let Some(limit) = limit
                && limit.conformant
            {
                RateLimitHeaders::from(limit).apply(response.headers_mut());
            }

            Ok(response)
        })
    }
}
