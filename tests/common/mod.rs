//! Shared helpers for the integration suites: a scriptable push transport,
//! a fake backend-of-record built on wiremock, and polling utilities.
#![allow(dead_code)]

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tillsync::client::push::transport::{TransportFactory, TransportStream};
use tillsync::shared::config::Config;
use tillsync::shared::error::SyncError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Install the test log subscriber once; repeat calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine configuration tuned for fast tests
pub fn test_config(server_url: &str, db_path: &std::path::Path) -> Config {
    Config::builder()
        .server_url(server_url)
        .database_path(db_path)
        .request_timeout(Duration::from_secs(2))
        .health_timeout(Duration::from_millis(500))
        .sync_interval(Duration::from_millis(100))
        .reconnect_base_delay(Duration::from_millis(20))
        .build()
        .expect("test config is valid")
}

/// One scripted outcome for a transport connect call
pub enum ScriptedConnect {
    /// Fail the connect attempt
    Refuse,
    /// Succeed; frames arrive through the paired sender
    Accept(mpsc::UnboundedReceiver<Result<String, SyncError>>),
}

/// Transport factory driven by a script of connect outcomes.
///
/// An empty script refuses every connect, which is the common case for
/// backoff tests.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ScriptedConnect>>,
    connects: AtomicU32,
    connect_times: Mutex<Vec<tokio::time::Instant>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    /// Queue a refused connect
    pub fn push_refuse(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedConnect::Refuse);
    }

    /// Queue an accepted connect and return the frame sender for it
    pub fn push_accept(&self) -> mpsc::UnboundedSender<Result<String, SyncError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script
            .lock()
            .unwrap()
            .push_back(ScriptedConnect::Accept(rx));
        tx
    }

    /// Total connect calls seen
    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Instants at which connect calls arrived
    pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
        self.connect_times.lock().unwrap().clone()
    }
}

impl TransportFactory for ScriptedTransport {
    fn connect(&self, _url: &str) -> BoxFuture<'static, Result<TransportStream, SyncError>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connect_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(ScriptedConnect::Accept(rx)) => {
                    Ok(UnboundedReceiverStream::new(rx).boxed() as TransportStream)
                }
                Some(ScriptedConnect::Refuse) | None => {
                    Err(SyncError::transport("connection refused"))
                }
            }
        })
    }
}

/// Collection endpoints the fake backend serves
pub const COLLECTION_PATHS: [&str; 10] = [
    "/api/menu-items",
    "/api/categories",
    "/api/orders",
    "/api/bills",
    "/api/transactions",
    "/api/customers",
    "/api/staff",
    "/api/settings",
    "/api/expenses",
    "/api/waiter-calls",
];

/// In-memory backend-of-record double.
///
/// Collection bodies are mutable mid-test; `Value::Null` makes an endpoint
/// answer 404 (the default for the settings singleton). POST endpoints
/// record accepted bodies and can be scripted to fail a number of times.
pub struct FakeBackend {
    pub server: MockServer,
    healthy: Arc<AtomicBool>,
    bodies: HashMap<&'static str, Arc<Mutex<serde_json::Value>>>,
    /// Bodies accepted by POST /api/orders
    pub orders_received: Arc<Mutex<Vec<serde_json::Value>>>,
    /// Bodies accepted by POST /api/waiter-calls
    pub waiter_calls_received: Arc<Mutex<Vec<serde_json::Value>>>,
    /// Bodies accepted by POST /api/menu-items
    pub menu_created: Arc<Mutex<Vec<serde_json::Value>>>,
    /// POST attempts remaining to fail with a 500 before succeeding again
    pub post_failures_remaining: Arc<AtomicU32>,
    /// Every POST attempt, including failed ones
    pub post_attempts: Arc<AtomicU32>,
    /// Artificial delay applied to POST responses
    pub post_delay: Arc<Mutex<Option<Duration>>>,
    /// Artificial delay applied to collection GET responses
    pub get_delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let healthy = Arc::new(AtomicBool::new(true));
        let post_failures_remaining = Arc::new(AtomicU32::new(0));
        let post_attempts = Arc::new(AtomicU32::new(0));
        let post_delay = Arc::new(Mutex::new(None));
        let get_delay = Arc::new(Mutex::new(None));
        let orders_received = Arc::new(Mutex::new(Vec::new()));
        let waiter_calls_received = Arc::new(Mutex::new(Vec::new()));
        let menu_created = Arc::new(Mutex::new(Vec::new()));

        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(HealthResponder(Arc::clone(&healthy)))
            .mount(&server)
            .await;

        let mut bodies = HashMap::new();
        for collection_path in COLLECTION_PATHS {
            let initial = if collection_path == "/api/settings" {
                serde_json::Value::Null
            } else {
                serde_json::json!([])
            };
            let body = Arc::new(Mutex::new(initial));
            Mock::given(method("GET"))
                .and(path(collection_path))
                .respond_with(GetResponder {
                    body: Arc::clone(&body),
                    delay: Arc::clone(&get_delay),
                })
                .mount(&server)
                .await;
            bodies.insert(collection_path, body);
        }

        // Accepted menu creations also appear in subsequent GETs
        let menu_body = Arc::clone(bodies.get("/api/menu-items").expect("menu body exists"));
        for (post_path, sink, echo, append_to) in [
            ("/api/orders", &orders_received, false, None),
            ("/api/waiter-calls", &waiter_calls_received, false, None),
            ("/api/menu-items", &menu_created, true, Some(menu_body)),
        ] {
            Mock::given(method("POST"))
                .and(path(post_path))
                .respond_with(PostResponder {
                    sink: Arc::clone(sink),
                    failures: Arc::clone(&post_failures_remaining),
                    attempts: Arc::clone(&post_attempts),
                    delay: Arc::clone(&post_delay),
                    echo,
                    append_to,
                })
                .mount(&server)
                .await;
        }

        Self {
            server,
            healthy,
            bodies,
            orders_received,
            waiter_calls_received,
            menu_created,
            post_failures_remaining,
            post_attempts,
            post_delay,
            get_delay,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Replace a collection's GET body
    pub fn set_collection(&self, collection_path: &str, value: serde_json::Value) {
        let body = self
            .bodies
            .get(collection_path)
            .unwrap_or_else(|| panic!("unknown collection path {collection_path}"));
        *body.lock().unwrap() = value;
    }
}

struct HealthResponder(Arc<AtomicBool>);

impl Respond for HealthResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.0.load(Ordering::SeqCst) {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true }))
        } else {
            ResponseTemplate::new(500)
        }
    }
}

struct GetResponder {
    body: Arc<Mutex<serde_json::Value>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl Respond for GetResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let value = self.body.lock().unwrap().clone();
        let delay = *self.delay.lock().unwrap();
        let template = if value.is_null() {
            ResponseTemplate::new(404)
        } else {
            ResponseTemplate::new(200).set_body_json(value)
        };
        with_delay(template, delay)
    }
}

struct PostResponder {
    sink: Arc<Mutex<Vec<serde_json::Value>>>,
    failures: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
    delay: Arc<Mutex<Option<Duration>>>,
    echo: bool,
    append_to: Option<Arc<Mutex<serde_json::Value>>>,
}

impl Respond for PostResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failing {
            return with_delay(ResponseTemplate::new(500), delay);
        }

        let body: serde_json::Value =
            serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null);
        self.sink.lock().unwrap().push(body.clone());
        if let Some(target) = &self.append_to {
            if let Some(existing) = target.lock().unwrap().as_array_mut() {
                existing.push(body.clone());
            }
        }
        let template = if self.echo {
            ResponseTemplate::new(200).set_body_json(body)
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true }))
        };
        with_delay(template, delay)
    }
}

fn with_delay(template: ResponseTemplate, delay: Option<Duration>) -> ResponseTemplate {
    match delay {
        Some(delay) => template.set_delay(delay),
        None => template,
    }
}

/// Poll a condition until it holds, panicking after five seconds.
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while std::time::Instant::now() < deadline {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}
