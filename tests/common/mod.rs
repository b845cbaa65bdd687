//! Shared helpers for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use cloud_streamer::{
    ObjectInfo, ObjectKey, RelayMetrics, ResolutionCache, ResolveError, Resolution, Resolver,
    StreamServer, StreamerConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Deterministic media content of `len` bytes
pub fn media(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

struct ScriptedObject {
    /// Direct URL and reported size, one per resolution
    versions: Vec<(String, u64)>,
    next: usize,
    title: Option<String>,
}

/// Resolver handing out a scripted sequence of direct URLs per key
///
/// Each `resolve` call advances to the next URL; the last one repeats.
/// Unknown keys resolve to `NotFound`.
pub struct ScriptedResolver {
    objects: Mutex<HashMap<String, ScriptedObject>>,
    resolve_calls: AtomicUsize,
    describe_calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedResolver {
            objects: Mutex::new(HashMap::new()),
            resolve_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
        })
    }

    pub fn add(&self, key: &str, urls: Vec<String>, total_length: u64) {
        self.add_titled(key, urls, total_length, None);
    }

    pub fn add_titled(&self, key: &str, urls: Vec<String>, total_length: u64, title: Option<&str>) {
        let versions = urls.into_iter().map(|url| (url, total_length)).collect();
        self.insert(key, versions, title);
    }

    /// Script resolutions whose reported size differs between calls
    pub fn add_versions(&self, key: &str, versions: Vec<(String, u64)>) {
        self.insert(key, versions, None);
    }

    fn insert(&self, key: &str, versions: Vec<(String, u64)>, title: Option<&str>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            ScriptedObject {
                versions,
                next: 0,
                title: title.map(str::to_string),
            },
        );
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, key: &ObjectKey) -> Result<Resolution, ResolveError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(key.as_str())
            .ok_or_else(|| ResolveError::NotFound(key.to_string()))?;

        let index = object.next.min(object.versions.len() - 1);
        object.next += 1;
        let (direct_url, total_length) = object.versions[index].clone();
        Ok(Resolution {
            direct_url,
            total_length,
        })
    }

    async fn describe(&self, key: &ObjectKey) -> Result<ObjectInfo, ResolveError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(key.as_str())
            .ok_or_else(|| ResolveError::NotFound(key.to_string()))?;
        Ok(ObjectInfo {
            title: object.title.clone(),
            extension: Some("mp4".to_string()),
        })
    }
}

/// A server running on an ephemeral port
pub struct TestServer {
    pub base_url: String,
    pub cache: Arc<ResolutionCache>,
    pub metrics: Arc<RelayMetrics>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<cloud_streamer::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Trigger shutdown and wait for the server to finish draining
    pub async fn stop(mut self) -> cloud_streamer::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

pub fn test_config() -> StreamerConfig {
    StreamerConfig {
        listen_address: "127.0.0.1:0".to_string(),
        drain_timeout_secs: 1,
        ..Default::default()
    }
}

pub async fn start_server(resolver: Arc<ScriptedResolver>) -> TestServer {
    start_server_with(resolver, test_config()).await
}

pub async fn start_server_with(resolver: Arc<ScriptedResolver>, config: StreamerConfig) -> TestServer {
    let server = StreamServer::bind(config, resolver).await.unwrap();
    let addr = server.local_addr().unwrap();
    let cache = server.cache();
    let metrics = server.metrics();

    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async {
        let _ = rx.await;
    }));

    TestServer {
        base_url: format!("http://{}", addr),
        cache,
        metrics,
        shutdown: Some(tx),
        handle,
    }
}

/// Poll `condition` until it holds or five seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}
