//! End-to-end tests for the tile proxy.
//!
//! Each test drives the axum router the way a client would and runs a
//! real mock upstream on an ephemeral loopback port, so the full
//! pipeline is exercised: route parsing, tier walk, write-behind,
//! promotion and the fixed response set.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tilegate::cache::{
    SharedMemoryCache, SharedMemoryConfig, TileCache, TileCacheConfig,
};
use tilegate::server::create_router;
use tower::ServiceExt;

const PNG_TILE: &[u8] = b"\x89PNG?";

/// Upstream double: serves a fixed body and records what it saw.
#[derive(Clone)]
struct Upstream {
    status: StatusCode,
    body: Arc<Vec<u8>>,
    hits: Arc<AtomicUsize>,
    seen_headers: Arc<Mutex<Vec<HeaderMap>>>,
    seen_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl Upstream {
    fn new(status: StatusCode, body: &[u8]) -> Self {
        Self {
            status,
            body: Arc::new(body.to_vec()),
            hits: Arc::new(AtomicUsize::new(0)),
            seen_headers: Arc::new(Mutex::new(Vec::new())),
            seen_queries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn upstream_handler(
    State(upstream): State<Upstream>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    upstream.hits.fetch_add(1, Ordering::SeqCst);
    upstream.seen_headers.lock().unwrap().push(headers);
    upstream.seen_queries.lock().unwrap().push(query);

    Response::builder()
        .status(upstream.status)
        .body(Body::from((*upstream.body).clone()))
        .unwrap()
}

/// Bind the mock upstream on an ephemeral port and return a URL scheme
/// pointing at it.
async fn spawn_upstream(upstream: Upstream) -> String {
    let app = Router::new()
        .route("/tiles/{z}/{x}/{y}", get(upstream_handler))
        .with_state(upstream);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}/tiles/{{z}}/{{x}}/{{y}}")
}

/// URL scheme for an origin nothing listens on.
fn unreachable_scheme() -> String {
    "http://127.0.0.1:9/tiles/{z}/{x}/{y}".to_string()
}

fn cache_config(temp: &TempDir, url_scheme: &str) -> TileCacheConfig {
    TileCacheConfig::new(["m", "osm"], url_scheme)
        .with_base_dir(temp.path())
        .with_http_timeout(Duration::from_millis(500))
}

async fn get_tile(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

/// Give spawned write-behind tasks time to land on disk.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

// S1: miss -> origin -> promote.
#[tokio::test]
async fn test_miss_fetches_from_origin_and_writes_back() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(StatusCode::OK, PNG_TILE);
    let scheme = spawn_upstream(upstream.clone()).await;

    let cache = Arc::new(TileCache::new(cache_config(&temp, &scheme)).unwrap());
    let router = create_router([Arc::clone(&cache)]);

    let (status, body) = get_tile(&router, "/m/osm/a/3/4/5/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG_TILE);
    assert_eq!(upstream.hits(), 1);
    assert_eq!(cache.stats().bytes_served_from_origin, 5);

    settle().await;
    let on_disk = std::fs::read(temp.path().join("m/osm/3/4/5.png")).unwrap();
    assert_eq!(on_disk, PNG_TILE);
}

// S2: disk hit, then memory hit after promotion.
#[tokio::test]
async fn test_disk_hit_then_memory_hit() {
    let temp = TempDir::new().unwrap();

    // Seed the disk through a first cache wired to a live origin.
    {
        let upstream = Upstream::new(StatusCode::OK, PNG_TILE);
        let scheme = spawn_upstream(upstream).await;
        let cache = Arc::new(TileCache::new(cache_config(&temp, &scheme)).unwrap());
        let router = create_router([cache]);
        let (status, _) = get_tile(&router, "/m/osm/a/3/4/5/").await;
        assert_eq!(status, StatusCode::OK);
        settle().await;
    }

    // Fresh cache over the same tree, origin unreachable, shared memory
    // attached and empty.
    let store = SharedMemoryCache::new(SharedMemoryConfig::new(1024 * 1024));
    let cache = Arc::new(
        TileCache::new(
            cache_config(&temp, &unreachable_scheme()).with_shared_memory(Arc::clone(&store)),
        )
        .unwrap(),
    );
    let router = create_router([Arc::clone(&cache)]);

    let (status, body) = get_tile(&router, "/m/osm/a/3/4/5/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG_TILE);
    assert_eq!(cache.stats().bytes_served_from_disk, 5);

    // Promotion happened; the repeat lands in memory.
    let (status, body) = get_tile(&router, "/m/osm/a/3/4/5/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PNG_TILE);
    assert_eq!(cache.stats().bytes_served_from_memory, 5);
    assert_eq!(cache.stats().bytes_served_from_cache(), 10);
}

// S3: TTL expiry sends the request back to the origin.
#[tokio::test]
async fn test_expired_tile_is_refetched() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(StatusCode::OK, PNG_TILE);
    let scheme = spawn_upstream(upstream.clone()).await;

    let cache = Arc::new(
        TileCache::new(cache_config(&temp, &scheme).with_ttl(Duration::from_millis(300)))
            .unwrap(),
    );
    let router = create_router([Arc::clone(&cache)]);

    let (status, _) = get_tile(&router, "/m/osm/a/3/4/5/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upstream.hits(), 1);
    settle().await;

    // Within the ttl the disk answers.
    let (status, _) = get_tile(&router, "/m/osm/a/3/4/5/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upstream.hits(), 1);
    assert_eq!(cache.stats().bytes_served_from_disk, 5);

    // Older than the ttl the disk rejects and the origin is consulted.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let (status, _) = get_tile(&router, "/m/osm/a/3/4/5/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upstream.hits(), 2);
}

// S4: bounded memory under the enforcement daemon.
#[tokio::test]
async fn test_bounded_memory_evicts_oldest_writes() {
    let store = SharedMemoryCache::new(
        SharedMemoryConfig::new(10).with_enforce_interval(Duration::from_millis(100)),
    );
    let _daemon = store.start_enforcement().unwrap();

    for key in ["a", "b", "c", "d"] {
        store.write("m/osm", &format!("{key}.png"), vec![0; 4]);
    }
    assert_eq!(store.size_bytes(), 16);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(store.size_bytes() <= 10);
    assert!(!store.contains("m/osm", "a.png"));
    assert!(!store.contains("m/osm", "b.png"));
    assert!(store.contains("m/osm", "c.png"));
    assert!(store.contains("m/osm", "d.png"));
}

// S5: too few path segments.
#[tokio::test]
async fn test_short_route_is_bad_request() {
    let temp = TempDir::new().unwrap();
    let cache = Arc::new(TileCache::new(cache_config(&temp, &unreachable_scheme())).unwrap());
    let router = create_router([cache]);

    let (status, body) = get_tile(&router, "/m/osm/a/").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, b"Bad Request");
}

// S6: an HTML body fails the PNG guard and nothing is persisted.
#[tokio::test]
async fn test_invalid_png_yields_not_found_and_no_write() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(StatusCode::OK, b"<html>");
    let scheme = spawn_upstream(upstream.clone()).await;

    let store = SharedMemoryCache::new(SharedMemoryConfig::new(1024 * 1024));
    let cache = Arc::new(
        TileCache::new(cache_config(&temp, &scheme).with_shared_memory(Arc::clone(&store)))
            .unwrap(),
    );
    let router = create_router([cache]);

    let (status, body) = get_tile(&router, "/m/osm/a/3/4/5/").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"Not found");
    assert_eq!(upstream.hits(), 1);

    settle().await;
    assert!(!temp.path().join("m/osm").exists(), "no file may be written");
    assert_eq!(store.size_bytes(), 0);
}

#[tokio::test]
async fn test_non_200_origin_is_not_found() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(StatusCode::FORBIDDEN, PNG_TILE);
    let scheme = spawn_upstream(upstream.clone()).await;

    let cache = Arc::new(TileCache::new(cache_config(&temp, &scheme)).unwrap());
    let router = create_router([cache]);

    let (status, _) = get_tile(&router, "/m/osm/a/3/4/5/").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(upstream.hits(), 1);
}

#[tokio::test]
async fn test_query_params_are_merged_into_origin_request() {
    let temp = TempDir::new().unwrap();
    let upstream = Upstream::new(StatusCode::OK, PNG_TILE);
    let scheme = spawn_upstream(upstream.clone()).await;

    let cache = Arc::new(TileCache::new(cache_config(&temp, &scheme)).unwrap());
    let router = create_router([cache]);

    let (status, _) = get_tile(&router, "/m/osm/a/3/4/5/?style=sat&extra=1").await;
    assert_eq!(status, StatusCode::OK);

    let queries = upstream.seen_queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].get("style").map(String::as_str), Some("sat"));
    assert_eq!(queries[0].get("extra").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_headers_forwarded_only_when_configured() {
    for forward in [false, true] {
        let temp = TempDir::new().unwrap();
        let upstream = Upstream::new(StatusCode::OK, PNG_TILE);
        let scheme = spawn_upstream(upstream.clone()).await;

        let cache = Arc::new(
            TileCache::new(cache_config(&temp, &scheme).with_forward_headers(forward)).unwrap(),
        );
        let router = create_router([cache]);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/m/osm/a/3/4/5/")
                    .header("x-tile-client", "integration")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let headers = upstream.seen_headers.lock().unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(
            headers[0].contains_key("x-tile-client"),
            forward,
            "forward_headers = {forward}"
        );
    }
}

#[tokio::test]
async fn test_two_caches_share_one_router_and_store() {
    let temp_osm = TempDir::new().unwrap();
    let temp_topo = TempDir::new().unwrap();
    let upstream = Upstream::new(StatusCode::OK, PNG_TILE);
    let scheme = spawn_upstream(upstream.clone()).await;

    let store = SharedMemoryCache::new(SharedMemoryConfig::new(1024 * 1024));

    let osm = Arc::new(
        TileCache::new(
            TileCacheConfig::new(["m", "osm"], scheme.clone())
                .with_base_dir(temp_osm.path())
                .with_shared_memory(Arc::clone(&store)),
        )
        .unwrap(),
    );
    let topo = Arc::new(
        TileCache::new(
            TileCacheConfig::new(["m", "topo"], scheme)
                .with_base_dir(temp_topo.path())
                .with_shared_memory(Arc::clone(&store)),
        )
        .unwrap(),
    );

    let router = create_router([Arc::clone(&osm), Arc::clone(&topo)]);

    let (status, _) = get_tile(&router, "/m/osm/a/3/4/5/").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get_tile(&router, "/m/topo/a/3/4/5/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upstream.hits(), 2);

    settle().await;
    // Both caches wrote into the same store under their own ids.
    assert_eq!(store.tile_count("m/osm"), 1);
    assert_eq!(store.tile_count("m/topo"), 1);
}
