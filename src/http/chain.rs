//! Ordered middleware chain.
//!
//! # Responsibilities
//! - Hold the request handlers in registration order
//! - Offer each request to the handlers in turn
//! - Stop at the first handler that answers
//! - Answer 404 when every handler declines
//!
//! # Design Decisions
//! - Handlers are objects behind one trait, run by a plain loop
//! - A declining handler hands the request back, so nothing is cloned
//! - Built once at startup; immutable at request time

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;

/// Result of offering a request to a middleware.
pub enum Outcome {
    /// The middleware produced the response; the chain stops.
    Handled(Response),
    /// The middleware declined; the request moves on to the next one.
    Pass(Request<Body>),
}

/// A request handler that may answer or decline.
pub trait Middleware: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Cheap check on the request head. `false` skips `handle` entirely.
    fn matches(&self, req: &Request<Body>) -> bool;

    /// Handle a matched request.
    fn handle(&self, req: Request<Body>) -> BoxFuture<'_, Outcome>;
}

/// An immutable, ordered list of middlewares.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::default()
    }

    /// Registration order.
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the request through the chain. Returns the response and the
    /// name of the middleware that produced it (`None` for the 404).
    pub async fn dispatch(&self, mut req: Request<Body>) -> (Response, Option<&str>) {
        for middleware in &self.middlewares {
            if !middleware.matches(&req) {
                continue;
            }
            match middleware.handle(req).await {
                Outcome::Handled(response) => return (response, Some(middleware.name())),
                Outcome::Pass(returned) => {
                    tracing::trace!(middleware = middleware.name(), "Declined");
                    req = returned;
                }
            }
        }

        tracing::debug!(path = %req.uri().path(), "No middleware handled request");
        ((StatusCode::NOT_FOUND, "Not Found").into_response(), None)
    }
}

/// Append-only builder for [`MiddlewareChain`].
#[derive(Default)]
pub struct ChainBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl ChainBuilder {
    /// Append a middleware; earlier ones are tried first.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Append a middleware when present.
    pub fn with_optional<M: Middleware + 'static>(self, middleware: Option<M>) -> Self {
        match middleware {
            Some(m) => self.with(m),
            None => self,
        }
    }

    pub fn build(self) -> MiddlewareChain {
        MiddlewareChain {
            middlewares: self.middlewares,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request whose path starts with `prefix`.
    struct Fixed {
        name: &'static str,
        prefix: &'static str,
        hits: Arc<AtomicUsize>,
    }

    impl Middleware for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn matches(&self, req: &Request<Body>) -> bool {
            req.uri().path().starts_with(self.prefix)
        }

        fn handle(&self, _req: Request<Body>) -> BoxFuture<'_, Outcome> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Outcome::Handled(self.name.into_response()) })
        }
    }

    /// Matches everything and always declines.
    struct Decline {
        seen: Arc<AtomicUsize>,
    }

    impl Middleware for Decline {
        fn name(&self) -> &str {
            "decline"
        }

        fn matches(&self, _req: &Request<Body>) -> bool {
            true
        }

        fn handle(&self, req: Request<Body>) -> BoxFuture<'_, Outcome> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Outcome::Pass(req) })
        }
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn first_match_wins() {
        let a_hits = Arc::new(AtomicUsize::new(0));
        let b_hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .with(Fixed { name: "a", prefix: "/", hits: a_hits.clone() })
            .with(Fixed { name: "b", prefix: "/", hits: b_hits.clone() })
            .build();

        let (response, by) = chain.dispatch(request("/anything")).await;
        assert_eq!(by, Some("a"));
        assert_eq!(body_text(response).await, "a");
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn declined_request_reaches_next() {
        let seen = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .with(Decline { seen: seen.clone() })
            .with(Fixed { name: "b", prefix: "/", hits: hits.clone() })
            .build();

        let (_, by) = chain.dispatch(request("/x")).await;
        assert_eq!(by, Some("b"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_matching_middleware_is_not_invoked() {
        let api_hits = Arc::new(AtomicUsize::new(0));
        let rest_hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .with(Fixed { name: "api", prefix: "/api", hits: api_hits.clone() })
            .with(Fixed { name: "rest", prefix: "/", hits: rest_hits.clone() })
            .build();

        let (_, by) = chain.dispatch(request("/index.html")).await;
        assert_eq!(by, Some("rest"));
        assert_eq!(api_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_is_not_found() {
        let seen = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder().with(Decline { seen }).build();

        let (response, by) = chain.dispatch(request("/missing")).await;
        assert_eq!(by, None);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn preserves_registration_order() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = MiddlewareChain::builder()
            .with(Fixed { name: "proxy", prefix: "/api", hits: hits.clone() })
            .with_optional(None::<Fixed>)
            .with(Fixed { name: "assets", prefix: "/", hits })
            .build();
        assert_eq!(chain.names(), vec!["proxy", "assets"]);
        assert_eq!(chain.len(), 2);
    }
}
