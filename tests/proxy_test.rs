//! API proxy behaviour through a running dev server.

mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::*;

#[tokio::test]
async fn api_prefix_is_rewritten_away() {
    let (upstream, seen) = start_recording_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let response = client()
        .get(server.url("/api/foo?x=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "upstream:/foo");

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].path, "/foo");
        assert_eq!(seen[0].query.as_deref(), Some("x=1"));
    }

    server.stop().await;
}

#[tokio::test]
async fn post_body_reaches_upstream_unchanged() {
    let (upstream, seen) = start_recording_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let response = client()
        .post(server.url("/api/login"))
        .header("content-type", "application/json")
        .body(r#"{"u":"x"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].path, "/login");
        assert_eq!(&seen[0].body[..], br#"{"u":"x"}"#);
    }

    server.stop().await;
}

#[tokio::test]
async fn bare_prefix_maps_to_root() {
    let (upstream, seen) = start_recording_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let response = client().get(server.url("/api")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(seen.lock().unwrap()[0].path, "/");

    server.stop().await;
}

#[tokio::test]
async fn refused_upstream_is_bad_gateway() {
    let port = refused_port().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.proxies.push(api_rule(&format!("http://127.0.0.1:{}", port)));
    let server = TestServer::start(config).await;

    let started = Instant::now();
    let response = client().get(server.url("/api/foo")).send().await.unwrap();
    assert_eq!(response.status(), 502);
    assert!(started.elapsed() < Duration::from_secs(3));

    // the server keeps serving afterwards
    let response = client().get(server.url("/nothing")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    server.stop().await;
}

#[tokio::test]
async fn proxy_wins_over_build_output() {
    let (upstream, seen) = start_recording_backend().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("api")).unwrap();
    std::fs::write(dir.path().join("api/users"), "from disk").unwrap();

    let mut config = test_config(dir.path());
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let body = client()
        .get(server.url("/api/users"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "upstream:/users");
    assert_eq!(seen.lock().unwrap().len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn silent_upstream_is_gateway_timeout() {
    let upstream = start_silent_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.proxy_secs = 1;
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let started = Instant::now();
    let response = client().get(server.url("/api/slow")).send().await.unwrap();
    assert_eq!(response.status(), 504);
    assert!(started.elapsed() < Duration::from_secs(3));

    server.stop().await;
}

#[tokio::test]
async fn request_timeout_cuts_off_slow_proxy() {
    let upstream = start_silent_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.timeouts.proxy_secs = 5;
    config.timeouts.request_secs = 1;
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let started = Instant::now();
    let response = client().get(server.url("/api/slow")).send().await.unwrap();
    assert_eq!(response.status(), 408);
    assert!(started.elapsed() < Duration::from_secs(3));

    server.stop().await;
}

#[tokio::test]
async fn request_headers_are_forwarded() {
    let (upstream, seen) = start_recording_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let response = client()
        .get(server.url("/api/me"))
        .header("x-custom", "abc")
        .header("authorization", "Bearer t")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    {
        let seen = seen.lock().unwrap();
        let headers = &seen[0].headers;
        let dev_host = server.addr.to_string();
        assert_eq!(headers["x-custom"], "abc");
        assert_eq!(headers["authorization"], "Bearer t");
        assert_eq!(headers["host"], dev_host.as_str());
        assert_eq!(headers["x-forwarded-for"], "127.0.0.1");
        assert_eq!(headers["x-forwarded-proto"], "http");
        assert_eq!(headers["x-forwarded-host"], dev_host.as_str());
    }

    server.stop().await;
}

#[tokio::test]
async fn change_origin_sends_upstream_host() {
    let (upstream, seen) = start_recording_backend().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    let mut rule = api_rule(&format!("http://{}", upstream));
    rule.change_origin = true;
    config.proxies.push(rule);
    let server = TestServer::start(config).await;

    let response = client()
        .get(server.url("/api/me"))
        .header("x-custom", "abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    {
        let seen = seen.lock().unwrap();
        let headers = &seen[0].headers;
        let upstream_host = upstream.to_string();
        assert_eq!(headers["host"], upstream_host.as_str());
        assert_eq!(headers["x-custom"], "abc");
        assert_eq!(headers["x-forwarded-host"], server.addr.to_string().as_str());
    }

    server.stop().await;
}

#[tokio::test]
async fn client_disconnect_abandons_upstream_request() {
    let (upstream, dropped) = start_slow_backend(Duration::from_secs(30)).await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.proxies.push(api_rule(&format!("http://{}", upstream)));
    let server = TestServer::start(config).await;

    let impatient = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let result = impatient.get(server.url("/api/slow")).send().await;
    assert!(result.unwrap_err().is_timeout());

    let mut released = false;
    for _ in 0..50 {
        if dropped.load(Ordering::SeqCst) {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(released, "upstream request still running after client left");

    server.stop().await;
}
