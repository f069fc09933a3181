//! Live-update channel middleware.
//!
//! Serves two paths:
//! - `{path}`: Server-Sent Events stream of [`UpdateEvent`]s with heartbeats
//! - `{path}/client.js`: the browser side of the channel

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
};
use futures_util::{future::BoxFuture, stream, Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream, IntervalStream};

use crate::config::LiveUpdateConfig;
use crate::http::chain::{Middleware, Outcome};
use crate::live_update::events::UpdateEvent;
use crate::live_update::hub::LiveUpdateHub;

const CLIENT_SCRIPT: &str = include_str!("client.js");

/// Render the client script for a channel configuration.
pub fn client_script(config: &LiveUpdateConfig) -> String {
    CLIENT_SCRIPT
        .replace("__DEVSERVER_PATH__", &config.path)
        .replace("__DEVSERVER_TIMEOUT__", &config.client_timeout_ms.to_string())
        .replace("__DEVSERVER_RELOAD__", if config.reload { "true" } else { "false" })
}

/// Holds long-lived update streams open to browser clients.
pub struct LiveUpdateMiddleware {
    path: String,
    script_path: String,
    script: String,
    heartbeat: Duration,
    hub: LiveUpdateHub,
}

impl LiveUpdateMiddleware {
    pub fn new(config: &LiveUpdateConfig, hub: LiveUpdateHub) -> Self {
        let path = config.path.trim_end_matches('/').to_string();
        Self {
            script_path: format!("{}/client.js", path),
            script: client_script(config),
            path,
            heartbeat: Duration::from_millis(config.heartbeat_ms.max(1)),
            hub,
        }
    }

    fn event_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        let (rx, guard) = self.hub.subscribe();
        let hub = self.hub.clone();
        let first = stream::once(std::future::ready(self.hub.sync_event()));

        let updates = BroadcastStream::new(rx).map(move |item| match item {
            Ok(event) => event,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Live-update client lagged, resyncing");
                hub.sync_event()
            }
        });

        let start = tokio::time::Instant::now() + self.heartbeat;
        let heartbeats = IntervalStream::new(tokio::time::interval_at(start, self.heartbeat))
            .map(|_| UpdateEvent::Heartbeat);

        first
            .chain(stream::select(updates, heartbeats))
            .take_until(self.hub.closed())
            .map(move |event| {
                tracing::trace!(client = %guard.id(), ?event, "Live update");
                Ok(to_sse(&event))
            })
    }
}

fn to_sse(event: &UpdateEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode live update");
            Event::default().comment("encode error")
        }
    }
}

impl Middleware for LiveUpdateMiddleware {
    fn name(&self) -> &str {
        "live-update"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        let path = req.uri().path();
        req.method() == Method::GET && (path == self.path || path == self.script_path)
    }

    fn handle(&self, req: Request<Body>) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            if req.uri().path() == self.script_path {
                let response = (
                    [
                        (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
                        (header::CACHE_CONTROL, "no-store"),
                    ],
                    self.script.clone(),
                )
                    .into_response();
                return Outcome::Handled(response);
            }

            let response: Response = Sse::new(self.event_stream()).into_response();
            Outcome::Handled(response)
        })
    }
}
