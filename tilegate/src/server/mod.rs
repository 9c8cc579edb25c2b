//! Inbound HTTP surface.
//!
//! A deliberately thin router: one wildcard route per cache, a handler
//! that hands the raw path, query map and headers to
//! [`TileCache::serve`] and maps the outcome onto the fixed response
//! set. All caching behavior lives in the cache core.

use crate::cache::{ServeError, TileCache};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;

/// Build a router serving every given cache under its route prefix.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tilegate::cache::{TileCache, TileCacheConfig};
/// use tilegate::server::create_router;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = Arc::new(TileCache::new(TileCacheConfig::new(
///     ["m", "osm"],
///     "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
/// ))?);
///
/// let router = create_router([cache]);
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:9001").await?;
/// axum::serve(listener, router).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(caches: impl IntoIterator<Item = Arc<TileCache>>) -> Router {
    let mut router = Router::new();
    for cache in caches {
        router = router.merge(cache_router(cache));
    }
    router
}

/// Build the router for a single cache.
pub fn cache_router(cache: Arc<TileCache>) -> Router {
    let path = format!("/{}/{{*rest}}", cache.route_string());
    Router::new()
        .route(&path, get(tile_handler))
        .with_state(cache)
}

/// `GET /<route…>/<s>/<z>/<y>/<x>/`
async fn tile_handler(
    State(cache): State<Arc<TileCache>>,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let header_pairs: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    match cache.serve(uri.path(), &query, &header_pairs).await {
        Ok(data) => tile_response(data),
        Err(ServeError::BadRequest) => plain_response(StatusCode::BAD_REQUEST, "Bad Request"),
        Err(ServeError::NotFound) => plain_response(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn tile_response(data: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header(header::CONTENT_TYPE, "image/png")
        .header(header::CONTENT_LENGTH, data.len().to_string())
        .body(Body::from(data))
        .unwrap()
}

fn plain_response(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .body(Body::from(body))
        .unwrap()
}
