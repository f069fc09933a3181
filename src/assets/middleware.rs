//! Build-output middleware.
//!
//! Serves the bundler's artifacts under the public path. Anything that is
//! not an artifact is passed on down the chain.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use percent_encoding::percent_decode_str;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::assets::store::ArtifactStore;
use crate::config::{AssetsConfig, Mode};
use crate::http::chain::{Middleware, Outcome};

pub struct AssetMiddleware {
    public_path: String,
    index: String,
    store: Arc<ArtifactStore>,
    mode: Mode,
}

impl AssetMiddleware {
    pub fn new(config: &AssetsConfig, store: Arc<ArtifactStore>, mode: Mode) -> Self {
        let mut public_path = config.public_path.clone();
        if !public_path.ends_with('/') {
            public_path.push('/');
        }
        Self {
            public_path,
            index: config.index.clone(),
            store,
            mode,
        }
    }

    /// Artifact key for a request path, or `None` when the path is outside
    /// the public path or tries to escape the output directory.
    fn artifact_key(&self, path: &str) -> Option<String> {
        let rest = if path.len() + 1 == self.public_path.len()
            && self.public_path.starts_with(path)
        {
            ""
        } else {
            path.strip_prefix(self.public_path.as_str())?
        };

        let decoded = percent_decode_str(rest).decode_utf8().ok()?;
        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return None,
                s if s.contains('\\') || s.contains('\0') => return None,
                s => segments.push(s),
            }
        }

        if segments.is_empty() || decoded.ends_with('/') {
            segments.push(self.index.as_str());
        }
        Some(segments.join("/"))
    }

    fn cache_control(&self, key: &str) -> HeaderValue {
        match self.mode {
            Mode::Development => HeaderValue::from_static("no-store"),
            Mode::Production if is_content_hashed(key) => {
                HeaderValue::from_static("public, max-age=31536000, immutable")
            }
            Mode::Production => HeaderValue::from_static("no-cache"),
        }
    }

    async fn serve(&self, key: String, req: Request<Body>) -> Outcome {
        let mut response = match self.store.as_ref() {
            ArtifactStore::Memory { snapshot, .. } => {
                let snapshot = snapshot.load_full();
                let dir_index = format!("{}/{}", key, self.index);
                let (key_found, artifact) = match snapshot.get(&key) {
                    Some(a) => (key.clone(), a),
                    None => match snapshot.get(&dir_index) {
                        Some(a) => (dir_index, a),
                        None => return Outcome::Pass(req),
                    },
                };

                let not_modified = req
                    .headers()
                    .get(header::IF_NONE_MATCH)
                    .map(|v| v.as_bytes() == artifact.etag.as_bytes())
                    .unwrap_or(false);

                let mut response = if not_modified {
                    StatusCode::NOT_MODIFIED.into_response()
                } else {
                    let mut r = Response::new(Body::from(artifact.body.clone()));
                    if let Ok(ct) = HeaderValue::from_str(&artifact.content_type) {
                        r.headers_mut().insert(header::CONTENT_TYPE, ct);
                    }
                    r.headers_mut()
                        .insert(header::CONTENT_LENGTH, HeaderValue::from(artifact.body.len()));
                    r
                };
                if let Ok(etag) = HeaderValue::from_str(&artifact.etag) {
                    response.headers_mut().insert(header::ETAG, etag);
                }
                response
                    .headers_mut()
                    .insert(header::CACHE_CONTROL, self.cache_control(&key_found));
                return Outcome::Handled(response);
            }
            ArtifactStore::Disk { root } => {
                let mut path = root.join(&key);
                if is_dir(&path).await {
                    path = path.join(&self.index);
                }
                if !is_file(&path).await {
                    return Outcome::Pass(req);
                }
                match ServeFile::new(&path).oneshot(req).await {
                    Ok(res) => res.map(Body::new),
                    Err(never) => match never {},
                }
            }
        };

        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, self.cache_control(&key));
        Outcome::Handled(response)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// `index.3f2a9c1b.js` style names: some dot-separated segment is a hex
/// digest of at least eight characters.
fn is_content_hashed(key: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or(key);
    name.split('.')
        .skip(1)
        .any(|part| part.len() >= 8 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

impl Middleware for AssetMiddleware {
    fn name(&self) -> &str {
        "assets"
    }

    fn matches(&self, req: &Request<Body>) -> bool {
        (req.method() == Method::GET || req.method() == Method::HEAD)
            && self.artifact_key(req.uri().path()).is_some()
    }

    fn handle(&self, req: Request<Body>) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            match self.artifact_key(req.uri().path()) {
                Some(key) => self.serve(key, req).await,
                None => Outcome::Pass(req),
            }
        })
    }
}
