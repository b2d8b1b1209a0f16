use std::time::Duration;

use rewrite_proxy_tests::{get, proxy_client, start_proxy};

const URL: &str = "http://fake.test/version";

fn rules(version: &str) -> String {
    format!("!{} => data:text/plain;{}\n", URL, version)
}

#[tokio::test]
async fn test_reload_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let rules_file = dir.path().join("config.txt");
    tokio::fs::write(&rules_file, rules("one")).await.unwrap();

    let (mut proxy, addr) = start_proxy(rules_file.clone()).await.unwrap();
    let client = proxy_client(addr);
    assert_eq!(get(&client, URL).await.unwrap().2, "one");

    let mut body = String::new();
    for _ in 0..50 {
        tokio::fs::write(&rules_file, rules("two")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        body = get(&client, URL).await.unwrap().2;
        if body == "two" {
            break;
        }
    }
    assert_eq!(body, "two");

    // A rules file that disappears keeps the last rules in place.
    tokio::fs::remove_file(&rules_file).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(get(&client, URL).await.unwrap().2, "two");

    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_explicit_reload() {
    let dir = tempfile::tempdir().unwrap();
    let rules_file = dir.path().join("config.txt");
    tokio::fs::write(&rules_file, rules("one")).await.unwrap();

    let (mut proxy, addr) = start_proxy(rules_file.clone()).await.unwrap();
    let client = proxy_client(addr);
    tokio::fs::write(&rules_file, rules("three")).await.unwrap();
    proxy.reload().await;
    assert_eq!(get(&client, URL).await.unwrap().2, "three");
    proxy.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_rules_file_forwards() {
    let dir = tempfile::tempdir().unwrap();
    let (mut proxy, _) = start_proxy(dir.path().join("missing.txt")).await.unwrap();
    assert_eq!(proxy.engine().snapshot().rule_count(), 0);
    proxy.stop().await.unwrap();
}
