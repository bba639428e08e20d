//! Per-episode state: operation counters, bounded history logs, and the
//! submitted answer.
//!
//! One context is live per environment process. It can either be owned
//! in-process (constructed at startup and handed to the dispatcher — never
//! ambient global state), or hosted by a separate long-lived
//! `taskrig context-server` process behind a Unix socket so the dispatcher
//! stays stateless across restarts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use taskrig_core::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Most recent entries kept per history log; oldest evicted first.
pub const HISTORY_BOUND: usize = 100;

/// How many recent entries a snapshot carries by default.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub result_count: usize,
    /// Observability only; never used for correctness.
    pub at_epoch_s: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
    pub url: String,
    pub content_length: usize,
    pub at_epoch_s: u64,
}

#[derive(Debug, Default)]
pub struct EpisodeContext {
    search_count: u64,
    fetch_count: u64,
    search_history: std::collections::VecDeque<SearchRecord>,
    fetch_history: std::collections::VecDeque<FetchRecord>,
    submitted_answer: Option<String>,
}

impl EpisodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_search(&mut self, query: &str, result_count: usize) {
        self.search_count += 1;
        self.search_history.push_back(SearchRecord {
            query: query.to_string(),
            result_count,
            at_epoch_s: now_epoch_s(),
        });
        // Bound enforced at write time, not read time.
        while self.search_history.len() > HISTORY_BOUND {
            self.search_history.pop_front();
        }
    }

    pub fn add_fetch(&mut self, url: &str, content_length: usize) {
        self.fetch_count += 1;
        self.fetch_history.push_back(FetchRecord {
            url: url.to_string(),
            content_length,
            at_epoch_s: now_epoch_s(),
        });
        while self.fetch_history.len() > HISTORY_BOUND {
            self.fetch_history.pop_front();
        }
    }

    pub fn submit_answer(&mut self, text: &str) {
        self.submitted_answer = Some(text.to_string());
    }

    pub fn submitted_answer(&self) -> Option<&str> {
        self.submitted_answer.as_deref()
    }

    pub fn search_count(&self) -> u64 {
        self.search_count
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_count
    }

    pub fn total_operations(&self) -> u64 {
        self.search_count + self.fetch_count
    }

    pub fn recent_searches(&self, limit: usize) -> Vec<SearchRecord> {
        let skip = self.search_history.len().saturating_sub(limit);
        self.search_history.iter().skip(skip).cloned().collect()
    }

    pub fn recent_fetches(&self, limit: usize) -> Vec<FetchRecord> {
        let skip = self.fetch_history.len().saturating_sub(limit);
        self.fetch_history.iter().skip(skip).cloned().collect()
    }

    /// The only operation permitted to decrease counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn snapshot(&self, recent_limit: usize) -> ContextSnapshot {
        ContextSnapshot {
            search_count: self.search_count,
            fetch_count: self.fetch_count,
            submitted_answer: self.submitted_answer.clone(),
            recent_searches: self.recent_searches(recent_limit),
            recent_fetches: self.recent_fetches(recent_limit),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub search_count: u64,
    pub fetch_count: u64,
    pub submitted_answer: Option<String>,
    pub recent_searches: Vec<SearchRecord>,
    pub recent_fetches: Vec<FetchRecord>,
}

/// Wire protocol of the context server: one JSON request per line, one JSON
/// response per line. Every successful response carries a fresh snapshot so
/// clients never need a second roundtrip.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ContextRequest {
    Reset,
    AddSearch { query: String, result_count: usize },
    AddFetch { url: String, content_length: usize },
    SubmitAnswer { text: String },
    Snapshot { recent_limit: usize },
}

#[derive(Debug, Serialize, Deserialize)]
struct ContextResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    snapshot: Option<ContextSnapshot>,
}

/// Apply one request and return the snapshot window it asked for.
/// Mutating requests report the default recent window.
fn apply(ctx: &mut EpisodeContext, req: ContextRequest) -> ContextSnapshot {
    let mut recent_limit = DEFAULT_RECENT_LIMIT;
    match req {
        ContextRequest::Reset => ctx.reset(),
        ContextRequest::AddSearch {
            query,
            result_count,
        } => ctx.add_search(&query, result_count),
        ContextRequest::AddFetch {
            url,
            content_length,
        } => ctx.add_fetch(&url, content_length),
        ContextRequest::SubmitAnswer { text } => ctx.submit_answer(&text),
        ContextRequest::Snapshot { recent_limit: n } => recent_limit = n,
    }
    ctx.snapshot(recent_limit)
}

/// Host one [`EpisodeContext`] behind a Unix socket.
///
/// Failure to bind the socket is the one fatal startup condition in this
/// system; everything after that is returned to clients as data.
pub async fn run_context_server(socket: PathBuf) -> anyhow::Result<()> {
    if socket.exists() {
        // A stale socket file from a previous run blocks bind.
        std::fs::remove_file(&socket)?;
    }
    let listener = UnixListener::bind(&socket)?;
    tracing::info!(socket = %socket.display(), "context server listening");

    let ctx = Arc::new(Mutex::new(EpisodeContext::new()));
    loop {
        let (stream, _addr) = listener.accept().await?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, ctx).await {
                tracing::debug!(error = %e, "context connection closed with error");
            }
        });
    }
}

async fn serve_connection(
    stream: UnixStream,
    ctx: Arc<Mutex<EpisodeContext>>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<ContextRequest>(&line) {
            Ok(req) => {
                let snapshot = {
                    let mut guard = ctx.lock().unwrap_or_else(|e| e.into_inner());
                    apply(&mut guard, req)
                };
                ContextResponse {
                    ok: true,
                    error: None,
                    snapshot: Some(snapshot),
                }
            }
            Err(e) => ContextResponse {
                ok: false,
                error: Some(format!("bad request: {e}")),
                snapshot: None,
            },
        };
        let mut out = serde_json::to_vec(&resp).unwrap_or_else(|_| b"{\"ok\":false}".to_vec());
        out.push(b'\n');
        write_half.write_all(&out).await?;
    }
    Ok(())
}

/// Explicit, owned handle to the episode context, passed into the dispatcher
/// at startup. `Remote` keeps the dispatcher stateless between restarts.
#[derive(Debug, Clone)]
pub enum ContextHandle {
    InProcess(Arc<Mutex<EpisodeContext>>),
    Remote { socket: PathBuf },
}

impl ContextHandle {
    pub fn in_process() -> Self {
        Self::InProcess(Arc::new(Mutex::new(EpisodeContext::new())))
    }

    pub fn remote(socket: impl AsRef<Path>) -> Self {
        Self::Remote {
            socket: socket.as_ref().to_path_buf(),
        }
    }

    /// Selected via `TASKRIG_CONTEXT_SOCKET`; defaults to in-process.
    pub fn from_env() -> Self {
        match std::env::var("TASKRIG_CONTEXT_SOCKET")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(path) => Self::remote(path),
            None => Self::in_process(),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::InProcess(_) => "in-process".to_string(),
            Self::Remote { socket } => format!("socket:{}", socket.display()),
        }
    }

    pub async fn reset(&self) -> Result<()> {
        self.roundtrip(ContextRequest::Reset).await.map(|_| ())
    }

    pub async fn add_search(&self, query: &str, result_count: usize) -> Result<()> {
        self.roundtrip(ContextRequest::AddSearch {
            query: query.to_string(),
            result_count,
        })
        .await
        .map(|_| ())
    }

    pub async fn add_fetch(&self, url: &str, content_length: usize) -> Result<()> {
        self.roundtrip(ContextRequest::AddFetch {
            url: url.to_string(),
            content_length,
        })
        .await
        .map(|_| ())
    }

    pub async fn submit_answer(&self, text: &str) -> Result<()> {
        self.roundtrip(ContextRequest::SubmitAnswer {
            text: text.to_string(),
        })
        .await
        .map(|_| ())
    }

    pub async fn snapshot(&self, recent_limit: usize) -> Result<ContextSnapshot> {
        self.roundtrip(ContextRequest::Snapshot { recent_limit })
            .await
    }

    async fn roundtrip(&self, req: ContextRequest) -> Result<ContextSnapshot> {
        match self {
            Self::InProcess(ctx) => {
                let mut guard = ctx.lock().unwrap_or_else(|e| e.into_inner());
                Ok(apply(&mut guard, req))
            }
            Self::Remote { socket } => {
                let fut = remote_roundtrip(socket, &req);
                match tokio::time::timeout(Duration::from_secs(5), fut).await {
                    Ok(res) => res,
                    Err(_) => Err(Error::Context(format!(
                        "context server at {} timed out",
                        socket.display()
                    ))),
                }
            }
        }
    }
}

async fn remote_roundtrip(socket: &Path, req: &ContextRequest) -> Result<ContextSnapshot> {
    let stream = UnixStream::connect(socket)
        .await
        .map_err(|e| Error::Context(format!("connect {}: {e}", socket.display())))?;
    let (read_half, mut write_half) = stream.into_split();

    let mut line = serde_json::to_vec(req).map_err(|e| Error::Context(e.to_string()))?;
    line.push(b'\n');
    write_half
        .write_all(&line)
        .await
        .map_err(|e| Error::Context(e.to_string()))?;

    let mut reader = BufReader::new(read_half);
    let mut buf = String::new();
    reader
        .read_line(&mut buf)
        .await
        .map_err(|e| Error::Context(e.to_string()))?;
    let resp: ContextResponse =
        serde_json::from_str(&buf).map_err(|e| Error::Context(format!("bad response: {e}")))?;
    if !resp.ok {
        return Err(Error::Context(
            resp.error.unwrap_or_else(|| "unknown context error".to_string()),
        ));
    }
    resp.snapshot
        .ok_or_else(|| Error::Context("response missing snapshot".to_string()))
}
