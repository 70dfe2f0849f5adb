//! Vault 配置源集成测试
//!
//! 使用 mockito 模拟 Vault KV v2 接口

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;
use vault_config::config::{GlobalConfig, SourceConfig};
use vault_config::source::{ConfigProvider, ReloadOutcome, VaultConfigSource};
use vault_config::VaultConfigError;

fn global(server: &ServerGuard) -> GlobalConfig {
    GlobalConfig {
        address: server.url(),
        token: Some("test-token".to_string()),
        namespace: Some("team-a".to_string()),
        ..GlobalConfig::default()
    }
}

fn secret_body(data: serde_json::Value, version: u64) -> String {
    json!({
        "data": {
            "data": data,
            "metadata": {"version": version}
        }
    })
    .to_string()
}

async fn list_mock(server: &mut ServerGuard, folder: &str, status: usize, body: &str) -> Mock {
    server
        .mock("GET", format!("/v1/secret/metadata/{folder}").as_str())
        .match_query(Matcher::UrlEncoded("list".into(), "true".into()))
        .match_header("x-vault-token", "test-token")
        .match_header("x-vault-namespace", "team-a")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

async fn read_mock(server: &mut ServerGuard, path: &str, status: usize, body: &str) -> Mock {
    server
        .mock("GET", format!("/v1/secret/data/{path}").as_str())
        .match_header("x-vault-token", "test-token")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

/// 模拟 app/{db, flags} 两个叶子的密钥树
async fn app_tree(server: &mut ServerGuard) -> Mock {
    list_mock(server, "app/", 200, r#"{"data":{"keys":["db","flags"]}}"#).await;
    list_mock(server, "app/db/", 404, r#"{"errors":[]}"#).await;
    list_mock(server, "app/flags/", 404, r#"{"errors":[]}"#).await;
    read_mock(server, "app", 404, r#"{"errors":[]}"#).await;
    read_mock(
        server,
        "app/flags",
        200,
        &secret_body(json!(["a", "b"]), 1),
    )
    .await;
    read_mock(
        server,
        "app/db",
        200,
        &secret_body(json!({"host": "x", "port": 5432}), 1),
    )
    .await
}

#[tokio::test]
async fn test_load_from_vault() {
    let mut server = Server::new_async().await;
    app_tree(&mut server).await;

    let source = SourceConfig::new("app", "app");
    let provider = VaultConfigSource::from_config(&global(&server), &source)
        .unwrap()
        .build()
        .await
        .unwrap();

    let snapshot = provider.current_snapshot();
    let entries: Vec<(&str, Option<&str>)> = snapshot.iter().collect();
    assert_eq!(
        entries,
        vec![
            ("db:host", Some("x")),
            ("db:port", Some("5432")),
            ("flags:0", Some("a")),
            ("flags:1", Some("b")),
        ]
    );
}

#[tokio::test]
async fn test_new_version_is_picked_up() {
    let mut server = Server::new_async().await;
    let db_v1 = app_tree(&mut server).await;

    let source = SourceConfig::new("app", "app");
    let provider = VaultConfigSource::from_config(&global(&server), &source)
        .unwrap()
        .build()
        .await
        .unwrap();
    let signal = provider.watch_for_change();

    assert_eq!(
        provider.trigger_reload().await.unwrap(),
        ReloadOutcome::Unchanged
    );
    assert!(!signal.has_fired());

    db_v1.remove_async().await;
    read_mock(
        &mut server,
        "app/db",
        200,
        &secret_body(json!({"host": "y", "port": 5432}), 2),
    )
    .await;

    assert!(matches!(
        provider.trigger_reload().await.unwrap(),
        ReloadOutcome::Changed { applied: 1, .. }
    ));
    assert!(signal.has_fired());
    assert_eq!(provider.get("db:host").as_deref(), Some("y"));
    assert_eq!(provider.get("flags:0").as_deref(), Some("a"));
}

#[tokio::test]
async fn test_unavailable_vault_is_fatal_on_startup() {
    let mut server = Server::new_async().await;
    list_mock(&mut server, "app/", 503, r#"{"errors":["Vault is sealed"]}"#).await;

    let source = SourceConfig::new("app", "app");
    let result = VaultConfigSource::from_config(&global(&server), &source)
        .unwrap()
        .build()
        .await;

    match result {
        Err(VaultConfigError::FatalStartup { cause, .. }) => {
            assert!(cause.to_string().contains("Vault is sealed"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("Vault 不可用时不应创建提供者"),
    }
}

#[tokio::test]
async fn test_malformed_secret_is_skipped() {
    let mut server = Server::new_async().await;
    list_mock(&mut server, "app/", 200, r#"{"data":{"keys":["bad","good"]}}"#).await;
    list_mock(&mut server, "app/bad/", 404, "{}").await;
    list_mock(&mut server, "app/good/", 404, "{}").await;
    read_mock(&mut server, "app", 404, "{}").await;
    read_mock(&mut server, "app/bad", 200, r#"{"data":{"data":{"k":1}}}"#).await;
    read_mock(&mut server, "app/good", 200, &secret_body(json!({"k": 2}), 3)).await;

    let source = SourceConfig::new("app", "app");
    let provider = VaultConfigSource::from_config(&global(&server), &source)
        .unwrap()
        .build()
        .await
        .unwrap();

    assert!(provider.get("bad:k").is_none());
    assert_eq!(provider.get("good:k").as_deref(), Some("2"));
}

#[tokio::test]
async fn test_base_path_as_folder_skips_root_read() {
    let mut server = Server::new_async().await;
    list_mock(&mut server, "app/", 200, r#"{"data":{"keys":["db"]}}"#).await;
    list_mock(&mut server, "app/db/", 404, "{}").await;
    read_mock(&mut server, "app/db", 200, &secret_body(json!({"host": "x"}), 1)).await;
    let root_read = server
        .mock("GET", "/v1/secret/data/app")
        .with_status(200)
        .with_body(secret_body(json!({"k": 1}), 1))
        .expect(0)
        .create_async()
        .await;

    let mut source = SourceConfig::new("app", "app");
    source.base_path_is_folder = true;
    let provider = VaultConfigSource::from_config(&global(&server), &source)
        .unwrap()
        .build()
        .await
        .unwrap();

    assert_eq!(provider.get("db:host").as_deref(), Some("x"));
    assert!(provider.get("k").is_none());
    root_read.assert_async().await;
}
