//! Shared harness: a real control plane plus a real crawler connected
//! over a Unix socket, with a scripted GitLab upstream.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use async_trait::async_trait;
use fw_control::{ControlConfig, Server, TokenRefresher};
use fw_core::{Account, AccountId, Clock, Command, NewJob, Provider, SystemClock};
use fw_crawler::{
    Anonymizer, ArtifactStore, CrawlError, CrawlerConfig, GitLabFetch, HttpResponse, LookupTable,
    SocketClient, TaskProcessor,
};
use fw_storage::Store;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;

pub const UPSTREAM: &str = "https://gitlab.example.com";

/// Scripted upstream: per-path one-shot responses take precedence over
/// a standing body; everything else 404s. Records every request.
#[derive(Default)]
pub struct FakeUpstream {
    standing: Mutex<HashMap<String, serde_json::Value>>,
    one_shot: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<(String, String)>>,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Always answer `path` with this JSON body.
    pub fn route(&self, path: &str, body: serde_json::Value) {
        self.standing.lock().insert(path.to_string(), body);
    }

    /// Answer the next request for `path` with this response, once.
    pub fn push_response(&self, path: &str, response: HttpResponse) {
        self.one_shot.lock().entry(path.to_string()).or_default().push_back(response);
    }

    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl GitLabFetch for FakeUpstream {
    async fn get(&self, url: &str, token: &str) -> Result<HttpResponse, CrawlError> {
        let path = url.split('?').next().unwrap_or(url).to_string();
        self.requests.lock().push((path.clone(), token.to_string()));

        if let Some(queue) = self.one_shot.lock().get_mut(&path) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }
        if let Some(body) = self.standing.lock().get(&path) {
            return Ok(ok_json(body.clone()));
        }
        Ok(HttpResponse {
            status: 404,
            status_text: "Not Found".into(),
            retry_after_secs: None,
            body: "{}".into(),
        })
    }
}

pub fn ok_json(body: serde_json::Value) -> HttpResponse {
    HttpResponse { status: 200, status_text: "OK".into(), retry_after_secs: None, body: body.to_string() }
}

/// A refresher answering with a fixed next token.
pub struct StaticRefresher {
    pub token: String,
}

#[async_trait]
impl TokenRefresher for StaticRefresher {
    async fn refresh(
        &self,
        _account: &Account,
    ) -> Result<fw_control::RefreshedToken, fw_control::RefreshError> {
        Ok(fw_control::RefreshedToken {
            access_token: self.token.clone(),
            refresh_token: None,
            expires_at_ms: Some(now_ms() + 3_600_000),
        })
    }
}

pub fn now_ms() -> u64 {
    Clock::epoch_ms(&SystemClock)
}

pub struct Pipeline {
    pub dir: TempDir,
    pub store: Arc<Store>,
    pub server: Arc<Server<SystemClock>>,
    pub upstream: Arc<FakeUpstream>,
    pub cancel: CancellationToken,
}

pub struct PipelineOptions {
    pub control: ControlConfig,
    pub crawler_tweak: fn(&mut CrawlerConfig),
    pub refresher: Option<StaticRefresher>,
    /// Specs that drive the socket by hand skip the real crawler.
    pub crawler: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            control: ControlConfig::default(),
            crawler_tweak: |_| {},
            refresher: None,
            crawler: true,
        }
    }
}

/// Boot the whole pipeline. The crawler starts polling immediately.
pub async fn start_pipeline(upstream: Arc<FakeUpstream>, options: PipelineOptions) -> Pipeline {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("fieldworkd.sock");
    let cancel = CancellationToken::new();

    // Control plane.
    let store = Arc::new(Store::open(&dir.path().join("state")).unwrap());
    store
        .upsert_account(Account {
            id: AccountId::from_string("acct-1"),
            provider: Provider::GitlabCloud,
            api_base_url: UPSTREAM.into(),
            user_id: Some("u1".into()),
            access_token: Some("T1".into()),
            refresh_token: Some("R1".into()),
            token_expires_at_ms: None,
        })
        .unwrap();
    let mut refreshers: HashMap<Provider, Arc<dyn TokenRefresher>> = HashMap::new();
    if let Some(refresher) = options.refresher {
        refreshers.insert(Provider::GitlabCloud, Arc::new(refresher));
    }
    let listener = UnixListener::bind(&socket).unwrap();
    let server = Server::new(Arc::clone(&store), options.control, SystemClock, refreshers);
    tokio::spawn(Arc::clone(&server).run(listener, cancel.clone()));

    if !options.crawler {
        return Pipeline { dir, store, server, upstream, cancel };
    }

    // Crawler.
    let mut crawler_config = CrawlerConfig {
        socket_path: socket,
        data_dir: dir.path().join("data"),
        anonymization_secret: "spec-secret".into(),
        poll_interval_ms: 100,
        heartbeat_interval_ms: 200,
        ..CrawlerConfig::default()
    };
    (options.crawler_tweak)(&mut crawler_config);

    let (client, jobs) = SocketClient::new(crawler_config.clone());
    let client = Arc::new(client);
    let fetch: Arc<dyn GitLabFetch> = upstream.clone();
    let processor = Arc::new(TaskProcessor::new(
        crawler_config.clone(),
        fetch,
        ArtifactStore::new(crawler_config.data_dir.clone()),
        Arc::new(Anonymizer::new("spec-secret", LookupTable::new(None, false))),
        client.handle(),
    ));
    {
        let client = Arc::clone(&client);
        let cancel = cancel.clone();
        tokio::spawn(async move { client.run(cancel).await });
    }
    {
        let cancel = cancel.clone();
        tokio::spawn(async move { processor.run(jobs, cancel).await });
    }

    Pipeline { dir, store, server, upstream, cancel }
}

impl Pipeline {
    /// Seed one queued job for the test account.
    pub fn seed_job(&self, command: Command, full_path: Option<&str>) -> fw_core::Job {
        let mut new = NewJob::new(
            command,
            AccountId::from_string("acct-1"),
            Provider::GitlabCloud,
            UPSTREAM,
        );
        if let Some(path) = full_path {
            new = new.full_path(path);
        }
        self.store.create_job(new, now_ms()).unwrap()
    }

    /// Seed an area row so hand-outs resolve a numeric entity id.
    pub fn seed_area(&self, full_path: &str, gitlab_id: i64, kind: fw_core::AreaType) {
        self.store
            .upsert_areas(
                vec![fw_core::Area {
                    full_path: full_path.to_string(),
                    gitlab_id,
                    name: full_path.to_string(),
                    kind,
                    created_at_ms: now_ms(),
                }],
                AccountId::from_string("acct-1"),
            )
            .unwrap();
    }

    pub fn socket(&self) -> std::path::PathBuf {
        self.dir.path().join("fieldworkd.sock")
    }
}

/// Poll until `check` passes or ~10 s elapse.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
