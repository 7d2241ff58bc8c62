//! Integration tests for campus-cache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MANIFEST: [&str; 3] = ["/", "/offline", "/student/dashboard"];

    /// Mock origin answering `200 page:<path>` for the manifest and `extra`
    async fn origin(extra: &[&str]) -> MockServer {
        let server = MockServer::start().await;
        for page in MANIFEST.iter().chain(extra) {
            Mock::given(method("GET"))
                .and(path(*page))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("Content-Type", "text/html")
                        .set_body_string(format!("page:{page}")),
                )
                .mount(&server)
                .await;
        }
        server
    }

    struct Env {
        temp: TempDir,
    }

    impl Env {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
            }
        }

        fn config_path(&self) -> PathBuf {
            self.temp.path().join("config.toml")
        }

        fn state_dir(&self) -> PathBuf {
            self.temp.path().join("state")
        }

        /// Write a config pointing at `origin` with a short manifest
        fn write_config(&self, origin: &str, version: &str) {
            let content = format!(
                "[controller]\norigin = '{origin}'\ncache_version = '{version}'\nprecache = ['/', '/offline', '/student/dashboard']\n\n[storage]\ndir = '{}'\n",
                self.temp.path().join("store").display()
            );
            std::fs::write(self.config_path(), content).unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("campus-cache");
            cmd.env("CAMPUS_CACHE_STATE_DIR", self.state_dir())
                .env("CAMPUS_CACHE_CONFIG", self.config_path());
            cmd
        }

        fn audit_log(&self) -> String {
            std::fs::read_to_string(self.state_dir().join("audit.log")).unwrap_or_default()
        }
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("campus-cache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Offline cache controller"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("campus-cache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("campus-cache"));
    }

    #[test]
    fn config_path_honours_env() {
        let env = Env::new();
        env.cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let env = Env::new();
        env.cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[controller]"))
            .stdout(predicate::str::contains("smart-campus-cache-v8"));
    }

    #[test]
    fn config_init_writes_file() {
        let env = Env::new();
        env.cmd().args(["config", "init"]).assert().success();
        assert!(env.config_path().exists());
    }

    #[test]
    fn invalid_config_fails_with_path() {
        let env = Env::new();
        std::fs::write(env.config_path(), "[controller\n").unwrap();
        env.cmd()
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn offline_page_gets_503() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", "--offline", "/some/other/page"])
            .assert()
            .success()
            .stdout(predicate::str::contains("HTTP 503"))
            .stdout(predicate::str::contains("Offline - No cached version available"));
    }

    #[test]
    fn offline_allowlisted_api_gets_empty_list() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", "--offline", "/api/quiz/42", "-i"])
            .assert()
            .success()
            .stdout(predicate::str::contains("HTTP 200 (fallback)"))
            .stdout(predicate::str::contains("application/json"))
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn offline_unlisted_api_gets_503() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", "--offline", "/api/admin/users"])
            .assert()
            .success()
            .stdout(predicate::str::contains("HTTP 503"));
    }

    #[test]
    fn unsupported_method_fails() {
        let env = Env::new();
        env.cmd()
            .args(["fetch", "-X", "BREW", "/"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unsupported request method"));
    }

    #[test]
    fn activate_requires_install() {
        let env = Env::new();
        env.cmd()
            .arg("activate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("has not been installed"));
    }

    #[test]
    fn install_fails_when_origin_unreachable() {
        let env = Env::new();
        // Port 9 (discard) on loopback is closed in test environments
        env.write_config("http://127.0.0.1:9", "v8");
        env.cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Install failed"));
    }

    #[tokio::test]
    async fn install_rejects_non_2xx_manifest_asset() {
        let env = Env::new();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/offline"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;
        for page in ["/", "/student/dashboard"] {
            Mock::given(method("GET"))
                .and(path(page))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!("page:{page}")))
                .mount(&server)
                .await;
        }
        env.write_config(&server.uri(), "v8");

        env.cmd()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Install failed"))
            .stderr(predicate::str::contains("/offline"))
            .stderr(predicate::str::contains("404"));

        // Nothing from the partial install is kept
        env.cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("GET ").not());
        assert!(!env.audit_log().contains("controller.installed"));
    }

    #[tokio::test]
    async fn install_then_serve_offline_from_cache() {
        let env = Env::new();
        let server = origin(&[]).await;
        let origin = server.uri();
        env.write_config(&origin, "v8");

        env.cmd().arg("install").assert().success();

        env.cmd()
            .args(["fetch", "--offline", "/student/dashboard"])
            .assert()
            .success()
            .stdout(predicate::str::contains("HTTP 200 (cache)"))
            .stdout(predicate::str::contains("page:/student/dashboard"));

        env.cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("GET {origin}/offline")));

        env.cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("3/3 assets cached"));

        let audit = env.audit_log();
        assert!(audit.contains("controller.installed"));
        assert!(audit.contains("controller.activated"));
    }

    #[tokio::test]
    async fn online_fetch_stores_matching_paths() {
        let env = Env::new();
        let server = origin(&["/student/grades", "/about"]).await;
        env.write_config(&server.uri(), "v8");
        env.cmd().arg("install").assert().success();

        env.cmd()
            .args(["fetch", "/student/grades"])
            .assert()
            .success()
            .stdout(predicate::str::contains("HTTP 200 (network)"));

        env.cmd()
            .args(["fetch", "/about"])
            .assert()
            .success();

        env.cmd()
            .args(["fetch", "--offline", "/student/grades"])
            .assert()
            .success()
            .stdout(predicate::str::contains("page:/student/grades"));

        env.cmd()
            .args(["fetch", "--offline", "/about"])
            .assert()
            .success()
            .stdout(predicate::str::contains("HTTP 503"));
    }

    #[tokio::test]
    async fn out_of_scope_page_bypasses_controller() {
        let env = Env::new();
        let server = origin(&[]).await;
        env.write_config(&server.uri(), "v8");
        let mut config = std::fs::read_to_string(env.config_path()).unwrap();
        config = config.replace("[controller]\n", "[controller]\nscope = '/student'\n");
        std::fs::write(env.config_path(), config).unwrap();
        env.cmd().arg("install").assert().success();

        env.cmd()
            .args(["fetch", "--offline", "--page", "/student/dashboard", "/api/quiz"])
            .assert()
            .success()
            .stdout(predicate::str::contains("HTTP 200 (fallback)"));

        env.cmd()
            .args(["fetch", "--offline", "--page", "/about", "/api/quiz"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Network request failed"));

        env.cmd()
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Scope:   /student"));
    }

    #[tokio::test]
    async fn new_version_evicts_old_generation() {
        let env = Env::new();
        let server = origin(&[]).await;
        let origin = server.uri();

        env.write_config(&origin, "v7");
        env.cmd().arg("install").assert().success();

        env.write_config(&origin, "v8");
        env.cmd().args(["install", "--no-activate"]).assert().success();
        env.cmd()
            .args(["cache", "generations"])
            .assert()
            .success()
            .stdout(predicate::str::contains("v7"))
            .stdout(predicate::str::contains("v8"));

        env.cmd()
            .arg("activate")
            .assert()
            .success()
            .stdout(predicate::str::contains("Evicted v7"));
        env.cmd()
            .args(["cache", "generations"])
            .assert()
            .success()
            .stdout(predicate::str::contains("v7").not());

        assert!(env.audit_log().contains("generation.evicted"));
    }

    #[tokio::test]
    async fn cache_clear_with_yes() {
        let env = Env::new();
        let server = origin(&[]).await;
        env.write_config(&server.uri(), "v8");
        env.cmd().arg("install").assert().success();

        env.cmd()
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cleared 1 generation(s)"));
        env.cmd()
            .args(["cache", "generations"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache generations found"));

        assert!(env.audit_log().contains("cache.cleared"));
    }

    #[test]
    fn completions_generate() {
        cargo_bin_cmd!("campus-cache")
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("campus-cache"));
    }
}

mod controller_tests {
    use campus_cache::controller::{ControllerState, OfflineCacheController, ResponseSource};
    use campus_cache::config::schema::ControllerConfig;
    use campus_cache::dispatch::{Dispatcher, Event, Outcome};
    use campus_cache::fetch::ScriptedFetcher;
    use campus_cache::http::{Method, Request, Response};
    use campus_cache::store::{CacheStore, DiskStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    const ORIGIN: &str = "http://localhost:3000";

    fn config(version: &str) -> ControllerConfig {
        ControllerConfig {
            cache_version: version.to_string(),
            precache: vec!["/".to_string(), "/offline".to_string()],
            ..ControllerConfig::default()
        }
    }

    fn network() -> Arc<ScriptedFetcher> {
        let fetcher = Arc::new(ScriptedFetcher::new());
        fetcher.route(&format!("{ORIGIN}/"), Response::new(200, "home"));
        fetcher.route(&format!("{ORIGIN}/offline"), Response::new(200, "offline"));
        fetcher.route(
            &format!("{ORIGIN}/api/courses"),
            Response::new(200, r#"[{"id":"math"}]"#).with_header("Content-Type", "application/json"),
        );
        fetcher
    }

    fn get(path: &str) -> Request {
        Request::parse(Method::Get, &format!("{ORIGIN}{path}")).unwrap()
    }

    #[tokio::test]
    async fn disk_cache_survives_a_new_controller() {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn CacheStore> = Arc::new(DiskStore::new(temp.path()));
        let fetcher = network();

        let first = OfflineCacheController::new(&config("v8"), store.clone(), fetcher.clone()).unwrap();
        first.install().await.unwrap();
        first.activate().await.unwrap();
        first.handle_fetch(&get("/api/courses")).await.unwrap();
        first.settle().await;

        fetcher.set_online(false);
        let reopened: Arc<dyn CacheStore> = Arc::new(DiskStore::new(temp.path()));
        let second = OfflineCacheController::new(&config("v8"), reopened, fetcher).unwrap();

        let served = second.handle_fetch(&get("/api/courses")).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.text(), r#"[{"id":"math"}]"#);
        assert_eq!(served.response.header("content-type"), Some("application/json"));
    }

    #[tokio::test]
    async fn dispatcher_upgrade_claims_open_pages() {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn CacheStore> = Arc::new(DiskStore::new(temp.path()));
        let fetcher = network();
        let dispatcher = Dispatcher::new("/", fetcher.clone()).unwrap();

        let v7 = Arc::new(OfflineCacheController::new(&config("v7"), store.clone(), fetcher.clone()).unwrap());
        dispatcher.register(v7.clone()).await.unwrap();
        let page = dispatcher.open_page("/student/dashboard");
        assert_eq!(dispatcher.controller_of(page), Some(v7.id()));

        let v8 = Arc::new(OfflineCacheController::new(&config("v8"), store.clone(), fetcher.clone()).unwrap());
        dispatcher.register(v8.clone()).await.unwrap();

        assert_eq!(dispatcher.controller_of(page), Some(v8.id()));
        assert_eq!(v7.state(), ControllerState::Superseded);
        assert_eq!(store.generations().await.unwrap(), vec!["v8".to_string()]);

        fetcher.set_online(false);
        let served = dispatcher.fetch(page, &get("/offline")).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.text(), "offline");
    }

    #[tokio::test]
    async fn unregistered_scope_passes_everything_through() {
        let fetcher = network();
        let dispatcher = Dispatcher::new("/", fetcher.clone()).unwrap();
        assert!(dispatcher.dispatch(Event::Install).await.is_err());
        assert!(dispatcher.dispatch(Event::Activate).await.is_err());

        let page = dispatcher.open_page("/");
        let outcome = dispatcher
            .dispatch(Event::Fetch {
                client: page,
                request: get("/"),
            })
            .await
            .unwrap();
        match outcome {
            Outcome::Response(served) => {
                assert_eq!(served.source, ResponseSource::Passthrough);
                assert_eq!(served.response.text(), "home");
            }
            other => panic!("expected a response, got {other:?}"),
        }

        fetcher.set_online(false);
        assert!(dispatcher.fetch(page, &get("/")).await.is_err());
    }
}
