//! Posting pool: the event loop that feeds articles to connections
//!
//! One task owns everything: the article queue, the idle list, the open-file
//! registry (inside the [`ArticleBuilder`]) and the connections themselves.
//! Connections report back over an unbounded channel, so no locking is
//! needed on the pool side even if a connection does its I/O on other tasks.

use crate::article::ArticleBuilder;
use crate::config::{PosterConfig, ServerConfig};
use crate::connection::{Connection, ConnectionEvent, ConnectionState, Notifier, ReconnectPolicy};
use crate::error::{PostError, Result};
use crate::scheduler::{Article, schedule};
use crate::yenc::{ContentEncoder, YencEncoder};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Minimum spacing between reconnect sweeps
const RECONNECT_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Longest the loop waits for a connection notification before re-checking
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Outcome of a completed posting run
#[derive(Debug, Clone, PartialEq)]
pub struct PostSummary {
    /// Article bytes handed to connections
    pub bytes: u64,
    /// Wall time from the first connect to completion
    pub elapsed: Duration,
    /// Articles whose post finished (connection reported ready afterwards)
    pub articles_posted: usize,
    /// Articles in flight on a connection that dropped
    pub articles_lost: usize,
}

impl PostSummary {
    /// Average throughput in KB/s
    #[must_use]
    pub fn kbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs / 1024.0
    }
}

/// Per-connection bookkeeping owned by the loop
struct Slot<C> {
    conn: C,
    /// Subject of the article in flight, if any
    posting: Option<String>,
    /// Reconnects issued since the connection last reported ready
    reconnects: u32,
    abandoned: bool,
}

/// Mutable state for one run
struct RunState<C> {
    slots: Vec<Slot<C>>,
    queue: VecDeque<Article>,
    idle: VecDeque<usize>,
    bytes: u64,
    posted: usize,
    lost: usize,
}

impl<C: Connection> RunState<C> {
    fn live_connections(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.abandoned).count()
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Ready(id) => {
                let Some(slot) = self.slots.get_mut(id) else {
                    warn!("Ready notification from unknown connection {}", id);
                    return;
                };
                if self.idle.contains(&id) {
                    warn!("Connection {} reported ready while already idle", id);
                    return;
                }
                if slot.abandoned {
                    info!("Abandoned connection {} came back", id);
                    slot.abandoned = false;
                }
                if let Some(subject) = slot.posting.take() {
                    debug!("Connection {} finished {}", id, subject);
                    self.posted += 1;
                } else {
                    debug!("Connection {} ready", id);
                }
                slot.reconnects = 0;
                self.idle.push_back(id);
            }
            ConnectionEvent::Disconnected(id) => {
                let Some(slot) = self.slots.get_mut(id) else {
                    warn!("Disconnect notification from unknown connection {}", id);
                    return;
                };
                self.idle.retain(|&idle| idle != id);
                if let Some(subject) = slot.posting.take() {
                    warn!("Connection {} dropped while posting {}, article lost", id, subject);
                    self.lost += 1;
                } else {
                    debug!("Connection {} disconnected", id);
                }
            }
        }
    }

    /// Reconnect every disconnected connection whose retry time has passed
    fn reconnect_due(&mut self, now: Instant, policy: &ReconnectPolicy) {
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if slot.abandoned || slot.conn.state() != ConnectionState::Disconnected {
                continue;
            }
            if slot.conn.retry_at().is_some_and(|at| at > now) {
                continue;
            }
            if policy.is_exhausted(slot.reconnects) {
                warn!(
                    "Abandoning connection {} after {} reconnect attempts",
                    id, slot.reconnects
                );
                slot.abandoned = true;
                continue;
            }

            slot.reconnects += 1;
            debug!("Reconnecting connection {} (attempt {})", id, slot.reconnects);
            slot.conn.connect();
        }
    }

    /// Pair idle connections with queued articles, longest-idle first
    ///
    /// A connection whose state hasn't caught up with its ready notification
    /// keeps its place in the idle list and is checked again next iteration.
    fn dispatch<E: ContentEncoder>(&mut self, builder: &mut ArticleBuilder<E>) -> Result<()> {
        let mut lagging = Vec::new();
        let result = self.dispatch_ready(builder, &mut lagging);
        for id in lagging.into_iter().rev() {
            self.idle.push_front(id);
        }
        result
    }

    fn dispatch_ready<E: ContentEncoder>(
        &mut self,
        builder: &mut ArticleBuilder<E>,
        lagging: &mut Vec<usize>,
    ) -> Result<()> {
        while !self.queue.is_empty() {
            let Some(id) = self.idle.pop_front() else {
                break;
            };
            let slot = &mut self.slots[id];
            let state = slot.conn.state();
            if state != ConnectionState::Idle {
                debug!("Connection {} reported ready but is {:?}, deferring", id, state);
                lagging.push(id);
                continue;
            }

            let Some(article) = self.queue.pop_front() else {
                break;
            };
            let built = builder.build(&article)?;
            self.bytes += built.wire_len();

            let subject = article.subject();
            debug!("Connection {} posting {}", id, subject);
            slot.posting = Some(subject);
            slot.conn.post(built.payload);
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.queue.is_empty() && self.idle.len() == self.live_connections()
    }
}

/// Multi-connection article poster
///
/// Drives `config.connections` connections, created through a factory, until
/// every scheduled article has been handed out and every live connection is
/// idle again.
///
/// # Example
///
/// ```no_run
/// use nntp_poster::{Connection, PostingPool, PosterConfig, ServerConfig};
///
/// # async fn example<C: Connection>(
/// #     make_connection: impl FnMut(usize, &ServerConfig, nntp_poster::Notifier) -> C,
/// # ) -> nntp_poster::Result<()> {
/// let config = PosterConfig::new(
///     ServerConfig::tls("news.example.com", "user", "pass"),
///     "alt.binaries.test",
///     "poster@example.com",
/// )
/// .with_connections(8);
///
/// let mut pool = PostingPool::new(config)?;
/// let summary = pool.post(&["/data/upload"], make_connection).await?;
/// println!("{} bytes at {:.2}KB/s", summary.bytes, summary.kbps());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PostingPool<E = YencEncoder> {
    config: PosterConfig,
    builder: ArticleBuilder<E>,
}

impl PostingPool<YencEncoder> {
    /// Create a pool using the default yEnc encoder
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Config`] if the configuration is invalid.
    pub fn new(config: PosterConfig) -> Result<Self> {
        Self::with_encoder(config, YencEncoder::default())
    }
}

impl<E: ContentEncoder> PostingPool<E> {
    /// Create a pool with a custom content encoder
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Config`] if the configuration is invalid.
    pub fn with_encoder(config: PosterConfig, encoder: E) -> Result<Self> {
        config.validate()?;
        let builder = ArticleBuilder::with_encoder(&config, encoder);
        Ok(Self { config, builder })
    }

    /// Run configuration
    pub fn config(&self) -> &PosterConfig {
        &self.config
    }

    /// Schedule the files in `dirs` and post them
    ///
    /// # Errors
    ///
    /// Fails before any connection is made if a directory can't be read;
    /// otherwise see [`run`](Self::run).
    pub async fn post<P, C, F>(&mut self, dirs: &[P], factory: F) -> Result<PostSummary>
    where
        P: AsRef<Path>,
        C: Connection,
        F: FnMut(usize, &ServerConfig, Notifier) -> C,
    {
        let queue = schedule(dirs, self.config.article_size)?;
        self.run(queue, factory).await
    }

    /// Post every article in `queue`
    ///
    /// `factory` is called once per connection with its index, the server
    /// configuration and the notifier it must report through.
    ///
    /// # Errors
    ///
    /// - any article build error ([`PostError::FileRead`],
    ///   [`PostError::SourceChanged`], [`PostError::PartOutOfOrder`]);
    ///   remaining articles are not posted
    /// - [`PostError::AllConnectionsLost`] if every connection was abandoned
    ///   under the reconnect policy while articles were still queued
    pub async fn run<C, F>(&mut self, queue: VecDeque<Article>, mut factory: F) -> Result<PostSummary>
    where
        C: Connection,
        F: FnMut(usize, &ServerConfig, Notifier) -> C,
    {
        let connections = self.config.connections as usize;
        info!(
            "Posting {} articles to {} over {} connections",
            queue.len(),
            self.config.newsgroup,
            connections
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        let slots = (0..connections)
            .map(|id| Slot {
                conn: factory(id, &self.config.server, Notifier::new(id, tx.clone())),
                posting: None,
                reconnects: 0,
                abandoned: false,
            })
            .collect();

        let mut state = RunState {
            slots,
            queue,
            idle: VecDeque::with_capacity(connections),
            bytes: 0,
            posted: 0,
            lost: 0,
        };

        for slot in &mut state.slots {
            slot.conn.connect();
        }

        let start = Instant::now();
        let mut last_reconnect = start;

        loop {
            while let Ok(event) = rx.try_recv() {
                state.handle_event(event);
            }

            let now = Instant::now();
            if now.duration_since(last_reconnect) >= RECONNECT_CHECK_INTERVAL {
                last_reconnect = now;
                state.reconnect_due(now, &self.config.reconnect);
            }

            state.dispatch(&mut self.builder)?;

            if state.is_complete() {
                let summary = PostSummary {
                    bytes: state.bytes,
                    elapsed: start.elapsed(),
                    articles_posted: state.posted,
                    articles_lost: state.lost,
                };
                info!(
                    "Posting complete - {} bytes in {:.2}s ({:.2}KB/s)",
                    summary.bytes,
                    summary.elapsed.as_secs_f64(),
                    summary.kbps()
                );
                if summary.articles_lost > 0 {
                    warn!("{} articles were lost to dropped connections", summary.articles_lost);
                }
                return Ok(summary);
            }

            if state.live_connections() == 0 {
                return Err(PostError::AllConnectionsLost {
                    remaining: state.queue.len(),
                });
            }

            // Wait for the next notification, at most one poll interval
            if let Ok(Some(event)) = timeout(POLL_INTERVAL, rx.recv()).await {
                state.handle_event(event);
            }
        }
    }
}
