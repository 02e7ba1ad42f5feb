//! Shared helpers: a scripted in-memory connection and article parsing

#![allow(dead_code)]

use nntp_poster::{ArticlePayload, Connection, ConnectionState, Notifier, PosterConfig, ServerConfig};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(connections: u32, article_size: u64) -> PosterConfig {
    PosterConfig::new(
        ServerConfig::plain("localhost", "user", "pass"),
        "alt.binaries.test",
        "poster <poster@example.com>",
    )
    .with_connections(connections)
    .with_article_size(article_size)
}

/// Deterministic, non-uniform file contents
pub fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i * 31 + 7) % 256) as u8).collect()
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

/// How a [`MockConnection`] behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Number of initial connect attempts that fail
    pub failing_connects: u32,
    /// Drop once, right after this many posts have finished
    pub drop_after_posts: Option<usize>,
    /// Drop while this (1-based) post is still in flight
    pub drop_during_post: Option<usize>,
    /// Delay before a dropped connection may be reconnected
    pub retry_delay: Duration,
    /// Simulated transmission time; `None` finishes posts immediately
    pub post_delay: Option<Duration>,
    /// Reads of `state()` that still report `Connecting` after going idle
    pub stale_state_reads: u32,
    /// Send every ready notification twice
    pub duplicate_ready: bool,
}

/// Everything the mock connections observed
#[derive(Debug, Default)]
pub struct Log {
    pub connects: Vec<(usize, Instant)>,
    pub disconnects: Vec<(usize, Instant, Instant)>,
    pub posts: Vec<(usize, Vec<u8>)>,
}

impl Log {
    pub fn connects_for(&self, id: usize) -> Vec<Instant> {
        self.connects
            .iter()
            .filter(|(conn, _)| *conn == id)
            .map(|(_, at)| *at)
            .collect()
    }
}

pub struct MockConnection {
    id: usize,
    notifier: Notifier,
    script: Script,
    log: Arc<Mutex<Log>>,
    state: Arc<Mutex<ConnectionState>>,
    retry_at: Option<Instant>,
    connect_attempts: u32,
    posts_started: usize,
    posts_finished: usize,
    dropped_after_post: bool,
    stale_reads: Cell<u32>,
}

impl MockConnection {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    fn notify_ready(&self) {
        self.notifier.ready();
        if self.script.duplicate_ready {
            self.notifier.ready();
        }
    }

    fn drop_connection(&mut self) {
        let now = Instant::now();
        let retry_at = now + self.script.retry_delay;
        self.retry_at = Some(retry_at);
        self.set_state(ConnectionState::Disconnected);
        self.log.lock().unwrap().disconnects.push((self.id, now, retry_at));
        self.notifier.disconnected();
    }
}

impl Connection for MockConnection {
    fn state(&self) -> ConnectionState {
        let state = *self.state.lock().unwrap();
        let stale = self.stale_reads.get();
        if state == ConnectionState::Idle && stale > 0 {
            self.stale_reads.set(stale - 1);
            return ConnectionState::Connecting;
        }
        state
    }

    fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    fn connect(&mut self) {
        self.log.lock().unwrap().connects.push((self.id, Instant::now()));
        self.connect_attempts += 1;

        if self.connect_attempts <= self.script.failing_connects {
            self.drop_connection();
            return;
        }

        self.retry_at = None;
        self.set_state(ConnectionState::Idle);
        self.notify_ready();
    }

    fn post(&mut self, payload: ArticlePayload) {
        assert_eq!(payload.position(), 0, "payload cursor not at start");
        self.log
            .lock()
            .unwrap()
            .posts
            .push((self.id, payload.into_inner()));
        self.posts_started += 1;

        if self.script.drop_during_post == Some(self.posts_started) {
            self.drop_connection();
            return;
        }

        if let Some(delay) = self.script.post_delay {
            self.set_state(ConnectionState::Posting);
            let state = Arc::clone(&self.state);
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                *state.lock().unwrap() = ConnectionState::Idle;
                notifier.ready();
            });
            return;
        }

        self.posts_finished += 1;
        self.set_state(ConnectionState::Idle);
        self.notify_ready();

        if !self.dropped_after_post && self.script.drop_after_posts == Some(self.posts_finished) {
            self.dropped_after_post = true;
            self.drop_connection();
        }
    }
}

/// Connection factory for the pool; connection `id` follows `scripts[id]`
pub fn factory(
    scripts: Vec<Script>,
    log: Arc<Mutex<Log>>,
) -> impl FnMut(usize, &ServerConfig, Notifier) -> MockConnection {
    move |id: usize, _server: &ServerConfig, notifier: Notifier| {
        let script = scripts.get(id).cloned().unwrap_or_default();
        MockConnection {
            id,
            notifier,
            stale_reads: Cell::new(script.stale_state_reads),
            script,
            log: Arc::clone(&log),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            retry_at: None,
            connect_attempts: 0,
            posts_started: 0,
            posts_finished: 0,
            dropped_after_post: false,
        }
    }
}

/// Fields pulled back out of a rendered article
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArticle {
    pub subject: String,
    pub name: String,
    pub part: u64,
    pub total: u64,
    pub size: u64,
    pub begin: u64,
    pub end: u64,
    pub chunk_len: u64,
    pub pcrc32: u32,
}

fn param<'a>(line: &'a str, key: &str) -> &'a str {
    let prefix = format!("{}=", key);
    line.split(' ')
        .find_map(|token| token.strip_prefix(prefix.as_str()))
        .unwrap_or_else(|| panic!("missing {} in {:?}", key, line))
}

pub fn parse_article(payload: &[u8]) -> ParsedArticle {
    let text = String::from_utf8_lossy(payload);
    let mut lines = text.split("\r\n");

    let subject = lines
        .clone()
        .find_map(|line| line.strip_prefix("Subject: "))
        .expect("Subject header")
        .to_string();
    let ybegin = lines
        .clone()
        .find(|line| line.starts_with("=ybegin "))
        .expect("=ybegin line");
    let ypart = lines
        .clone()
        .find(|line| line.starts_with("=ypart "))
        .expect("=ypart line");
    let yend = lines
        .find(|line| line.starts_with("=yend "))
        .expect("=yend line");

    assert_eq!(param(ybegin, "line"), "256");

    ParsedArticle {
        subject,
        name: ybegin
            .split_once(" name=")
            .map(|(_, name)| name.to_string())
            .expect("name"),
        part: param(ybegin, "part").parse().unwrap(),
        total: param(ybegin, "total").parse().unwrap(),
        size: param(ybegin, "size").parse().unwrap(),
        begin: param(ypart, "begin").parse().unwrap(),
        end: param(ypart, "end").parse().unwrap(),
        chunk_len: param(yend, "size").parse().unwrap(),
        pcrc32: u32::from_str_radix(param(yend, "pcrc32"), 16).unwrap(),
    }
}
