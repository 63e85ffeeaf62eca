//! Rate limiting middleware for HTTP requests, one layer per registration.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::body::Body;
use http::{Request, Response};
use rate_limit::{Decision, Interceptor, RequestLimitState};
use tower::Layer;

use crate::error;

#[derive(Clone)]
pub struct RateLimitLayer(Arc<Interceptor>);

impl RateLimitLayer {
    pub fn new(interceptor: Arc<Interceptor>) -> Self {
        Self(interceptor)
    }
}

impl<Service> Layer<Service> for RateLimitLayer
where
    Service: Send + Clone,
{
    type Service = RateLimitService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RateLimitService {
            next,
            interceptor: self.0.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<Service> {
    next: Service,
    interceptor: Arc<Interceptor>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RateLimitService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let interceptor = self.interceptor.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let decision = interceptor.intercept(&mut parts).await;

            // Inner layers see the state through the request. Ours goes out with
            // the response unless an inner layer already stored a newer one.
            let state = parts.extensions.get::<RequestLimitState>().copied();

            let mut response = match decision {
                Decision::Continue => next.call(Request::from_parts(parts, body)).await?,
                Decision::Reject(error) => {
                    log::debug!("Request rejected in {}: {error}", interceptor.phase());
                    error::into_response(error)
                }
            };

            if let Some(state) = state
                && response.extensions().get::<RequestLimitState>().is_none()
            {
                response.extensions_mut().insert(state);
            }

            Ok(response)
        })
    }
}
