//! End-to-end tests driving a live server over HTTP
//!
//! Each test starts a server on a free port against its own temporary
//! extensions root and talks to it with `reqwest`.

use std::net::SocketAddr;
use std::time::Duration;

use forum_server::{AppState, ForumServer, ServerConfig};
use forum_test_utils::{ArchiveBuilder, TestExtensions};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};

const TOKEN: &str = "test-admin-token";

struct Harness {
    env: TestExtensions,
    server: ForumServer,
    client: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(TestExtensions::new(), |_| {}).await
    }

    async fn start_with(env: TestExtensions, tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let mut config = ServerConfig::default();
        config.server.admin_token = Some(TOKEN.to_string());
        config.extensions.root = env.root();
        config.extensions.configs_dir = env.configs_dir();
        config.extensions.protected.insert("core-editor".to_string());
        tweak(&mut config);

        let state = AppState::new(&config).unwrap();
        let server = ForumServer::start(state, SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        Self {
            env,
            server,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.url())
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(TOKEN)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(TOKEN)
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(TOKEN)
    }

    async fn install(&self, id: &str, archive: Vec<u8>) -> reqwest::Response {
        self.post(&format!("/extension/{id}/install"))
            .header("content-type", "application/zip")
            .header("x-forum-user", "alice")
            .body(archive)
            .send()
            .await
            .unwrap()
    }
}

async fn json_of(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response.json::<Value>().await.unwrap();
    (status, body)
}

#[tokio::test(flavor = "multi_thread")]
async fn health_is_open_and_admin_routes_need_token() {
    let h = Harness::start().await;

    let health = h.client.get(h.url("/health")).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.json::<Value>().await.unwrap()["status"], "ok");

    let (status, body) = json_of(h.client.get(h.url("/extension")).send().await.unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "forbidden");

    let wrong = h
        .client
        .get(h.url("/extension"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = json_of(h.get("/extension").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "data": []}));
}

#[tokio::test(flavor = "multi_thread")]
async fn install_lists_extension_disabled() {
    let h = Harness::start().await;

    let (status, body) = json_of(
        h.install("cookie-consent", ArchiveBuilder::plugin("cookie-consent").enabled(true).build())
            .await,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "cookie-consent");
    assert_eq!(body["data"]["enabled"], false);
    assert_eq!(body["data"]["status"], "inactive");
    assert_eq!(body["data"]["installedBy"], "alice");

    let (_, listing) = json_of(h.get("/extension").send().await.unwrap()).await;
    assert_eq!(listing["data"].as_array().unwrap().len(), 1);

    let (_, index) = json_of(h.get("/extension/config").send().await.unwrap()).await;
    assert_eq!(index["data"]["extensions"][0]["id"], "cookie-consent");
    assert!(
        index["data"]["extensions"][0]["checksum"]
            .as_str()
            .unwrap()
            .starts_with("sha256:")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn install_failures_are_reported_with_kind() {
    let h = Harness::start().await;
    h.install("alpha", ArchiveBuilder::plugin("alpha").build()).await;

    let (status, body) = json_of(h.install("alpha", ArchiveBuilder::plugin("alpha").build()).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "conflict");

    let (status, body) = json_of(h.install("beta", ArchiveBuilder::plugin("gamma").build()).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, body) = json_of(h.install("beta", Vec::new()).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    assert_eq!(h.env.entries(), vec!["alpha", "extensions.json", "extensions.json.lock"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_upload_is_rejected() {
    let h = Harness::start_with(TestExtensions::new(), |config| {
        config.server.max_upload_bytes = 64;
    })
    .await;

    let archive = ArchiveBuilder::plugin("alpha")
        .file("bundle.js", &"x".repeat(4096))
        .build();
    let response = h.install("alpha", archive).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    h.env.assert_file_not_exists("extensions/alpha");
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_id_is_not_found() {
    let h = Harness::start().await;

    for path in ["/extension/ghost/enable", "/extension/ghost/uninstall"] {
        let (status, body) = json_of(h.post(path).send().await.unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(body["kind"], "not_found");
    }

    let (status, _) = json_of(h.get("/extension/configs/ghost").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!h.env.configs_dir().join("ghost.json").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn enable_toggle_and_stats() {
    let env = TestExtensions::new();
    env.write_plugin("alpha", false);
    env.write_plugin("beta", false);
    let h = Harness::start_with(env, |_| {}).await;

    let (status, body) = json_of(h.post("/extension/alpha/enable").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, body) = json_of(
        h.post("/extension/beta/toggle")
            .json(&json!({"enabled": true}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], true);

    h.post("/extension/beta/disable").send().await.unwrap();

    let (_, stats) = json_of(h.get("/extension/stats").send().await.unwrap()).await;
    assert_eq!(stats["data"]["total"], 2);
    assert_eq!(stats["data"]["active"], 1);
    assert_eq!(stats["data"]["inactive"], 1);
    assert_eq!(stats["data"]["plugins"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn activating_theme_deactivates_previous() {
    let env = TestExtensions::new();
    env.write_theme("light", true);
    env.write_theme("dark", false);
    let h = Harness::start_with(env, |_| {}).await;

    let (status, body) = json_of(h.post("/extension/dark/activate").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (_, listing) = json_of(h.get("/extension").send().await.unwrap()).await;
    let enabled: Vec<&str> = listing["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["enabled"] == true)
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(enabled, vec!["dark"]);

    h.env.write_plugin("plain", false);
    let (status, body) = json_of(h.post("/extension/plain/activate").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test(flavor = "multi_thread")]
async fn integrations_follow_lifecycle() {
    let env = TestExtensions::new();
    env.write_plugin("alpha", false);
    let h = Harness::start_with(env, |_| {}).await;

    h.post("/extension/alpha/enable").send().await.unwrap();

    let mut names = Vec::new();
    for _ in 0..50 {
        let (_, body) = json_of(h.get("/extension/integrations").send().await.unwrap()).await;
        names = body["data"]["integrations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap().to_string())
            .collect();
        if !names.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(names, vec!["alpha"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn config_round_trip_and_validation() {
    let env = TestExtensions::new();
    env.write_plugin_with_schema(
        "cookie-consent",
        json!({"groups": [{"key": "general", "title": "General", "properties": {
            "message": {"type": "string", "default": "We use cookies", "minLength": 3},
            "delay": {"type": "integer", "default": 0, "minimum": 0, "maximum": 10}
        }}]}),
    );
    let h = Harness::start_with(env, |_| {}).await;

    let (status, body) = json_of(h.get("/extension/configs/cookie-consent").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userConfig"], json!({"delay": 0, "message": "We use cookies"}));

    let (status, body) = json_of(
        h.put("/extension/configs/cookie-consent")
            .json(&json!({"delay": 5}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userConfig"]["delay"], 5);

    let (status, body) = json_of(
        h.put("/extension/configs/cookie-consent")
            .json(&json!({"delay": 50, "message": "x"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("delay"), "{message}");
    assert!(message.contains("message"), "{message}");

    let (status, body) = json_of(
        h.post("/extension/configs/cookie-consent/validate")
            .json(&json!({"delay": "soon", "message": "hello"}))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isValid"], false);
    assert_eq!(body["data"]["errors"][0]["key"], "delay");

    let (_, body) = json_of(
        h.post("/extension/configs/cookie-consent/reset")
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(body["data"]["userConfig"]["delay"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn uninstall_removes_files_and_respects_protection() {
    let env = TestExtensions::new();
    env.write_plugin("core-editor", true);
    let h = Harness::start_with(env, |_| {}).await;
    h.install("alpha", ArchiveBuilder::plugin("alpha").build()).await;

    let (status, body) = json_of(h.post("/extension/alpha/uninstall").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "alpha");
    h.env.assert_file_not_exists("extensions/alpha");

    let (_, index) = json_of(h.get("/extension/config").send().await.unwrap()).await;
    assert_eq!(index["data"]["extensions"], json!([]));

    let (status, body) = json_of(h.post("/extension/core-editor/uninstall").send().await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "forbidden");
    h.env.assert_file_exists("extensions/core-editor/manifest.json");
}

#[tokio::test(flavor = "multi_thread")]
async fn event_stream_reports_transitions() {
    let env = TestExtensions::new();
    env.write_plugin("alpha", false);
    let h = Harness::start_with(env, |_| {}).await;

    let mut stream = h.get("/extension/events").send().await.unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    h.post("/extension/alpha/enable").send().await.unwrap();

    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = stream.chunk().await.unwrap() {
            received.push_str(&String::from_utf8_lossy(&chunk));
            if received.contains("\"id\":\"alpha\"") {
                break;
            }
        }
    })
    .await;

    assert!(read.is_ok(), "no event within timeout, got: {received}");
    assert!(received.contains("event: enabled"), "{received}");
}
