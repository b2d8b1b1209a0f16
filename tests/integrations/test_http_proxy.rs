use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use http::header::CONTENT_TYPE;
use http::StatusCode;
use rewrite_proxy_tests::{get, proxy_client, start_origin, start_proxy, start_upstream_proxy};

async fn write_rules(dir: &Path, rules: String) -> PathBuf {
    let rules_file = dir.join("config.txt");
    tokio::fs::write(&rules_file, rules).await.unwrap();
    rules_file
}

#[tokio::test]
async fn test_rules_through_live_proxy() {
    let origin = start_origin();
    let dir = tempfile::tempdir().unwrap();
    let rules_file = dir.path().join("config.txt");
    let rules = format!(
        r#"
$SetRequestHeader X-Rewrite-Proxy: on
!http://fake.test/hello => data:text/plain;hello from ${{host}}
http://{origin}/old => http://{origin}/new
$SetResponseHeader X-Rule: rewrite
http://{origin}/drop =>

[teapot]
http://{origin}/tea => $
$StatusCode 418

[#disabled]
http://{origin}/ =>
"#,
        origin = origin
    );
    tokio::fs::write(&rules_file, rules).await.unwrap();

    let (mut proxy, addr) = start_proxy(rules_file).await.unwrap();
    let client = proxy_client(addr);

    let (status, headers, body) = get(&client, "http://fake.test/hello").await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "text/plain");
    assert_eq!(body, "hello from fake.test");

    let (status, headers, body) = get(&client, &format!("http://{}/old/x?y=1", origin))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-rule"], "rewrite");
    assert_eq!(body, "/new/x?y=1 on");

    let (status, _, body) = get(&client, &format!("http://{}/tea", origin))
        .await
        .unwrap();
    assert_eq!(status.as_u16(), 418);
    assert_eq!(body, "/tea on");

    let (status, headers, body) = get(&client, &format!("http://{}/other", origin))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("x-rule").is_none());
    // No rule matched, so not even the global modifiers apply.
    assert_eq!(body, "/other -");

    assert!(get(&client, &format!("http://{}/drop", origin)).await.is_err());

    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let rules_file = dir.path().join("config.txt");
    tokio::fs::write(&rules_file, "!http://fake.test/ => http://127.0.0.1:1/\n")
        .await
        .unwrap();

    let (mut proxy, addr) = start_proxy(rules_file).await.unwrap();
    let client = proxy_client(addr);
    let (status, _, _) = get(&client, "http://fake.test/").await.unwrap();
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_forward_via_upstream_proxy() {
    let upstream = start_upstream_proxy();
    let dir = tempfile::tempdir().unwrap();
    let rules_file = write_rules(
        dir.path(),
        format!(
            "!http://fake.test/p => proxy:u:p@127.0.0.1:{}\n",
            upstream.port()
        ),
    )
    .await;

    let (mut proxy, addr) = start_proxy(rules_file).await.unwrap();
    let client = proxy_client(addr);
    for _ in 0..2 {
        let (status, _, body) = get(&client, "http://fake.test/p").await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "http://fake.test/p Basic dTpw");
    }
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_serve_file() {
    let root = tempfile::tempdir().unwrap();
    tokio::fs::write(root.path().join("index.html"), "<h1>hi</h1>")
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let rules_file = write_rules(
        dir.path(),
        format!(
            "http://fake.test/static => file://{}\n$SetResponseHeader Content-Type: text/html\n",
            root.path().display()
        ),
    )
    .await;

    let (mut proxy, addr) = start_proxy(rules_file).await.unwrap();
    let client = proxy_client(addr);

    let (status, headers, body) = get(&client, "http://fake.test/static/index.html")
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "text/html");
    assert_eq!(body, "<h1>hi</h1>");

    let (status, _, _) = get(&client, "http://fake.test/static/missing.html")
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_eval_directive_runs_before_dispatch() {
    let origin = start_origin();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("evaluated");
    let rules_file = write_rules(
        dir.path(),
        format!(
            "!http://{}/eval => eval:touch {}\n",
            origin,
            marker.display()
        ),
    )
    .await;

    let (mut proxy, addr) = start_proxy(rules_file).await.unwrap();
    let client = proxy_client(addr);
    let (status, _, body) = get(&client, &format!("http://{}/eval", origin))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "/eval -");
    assert!(marker.exists());
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_slow_rules_do_not_block_other_requests() {
    let origin = start_origin();
    let dir = tempfile::tempdir().unwrap();
    let rules_file = write_rules(
        dir.path(),
        format!(
            r#"
http://{origin}/delayed => $
$Delay 800
!http://fake.test/command => bin:sleep 1; printf done
!http://fake.test/fast => data:text/plain;fast
"#,
            origin = origin
        ),
    )
    .await;

    let (mut proxy, addr) = start_proxy(rules_file).await.unwrap();
    let client = proxy_client(addr);

    let spawn_get = |url: String| {
        let client = client.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let (_, _, body) = get(&client, &url).await.unwrap();
            (body, start.elapsed())
        })
    };
    let delayed = spawn_get(format!("http://{}/delayed", origin));
    let command = spawn_get("http://fake.test/command".to_string());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    let (_, _, body) = get(&client, "http://fake.test/fast").await.unwrap();
    assert_eq!(body, "fast");
    assert!(start.elapsed() < Duration::from_millis(500));

    let (body, elapsed) = delayed.await.unwrap();
    assert_eq!(body, "/delayed -");
    assert!(elapsed >= Duration::from_millis(800));

    let (body, elapsed) = command.await.unwrap();
    assert_eq!(body, "done");
    assert!(elapsed >= Duration::from_secs(1));

    proxy.stop().await.unwrap();
}
