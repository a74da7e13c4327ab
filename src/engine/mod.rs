//! Synchronization engine: turns a delivery adapter into an ordered stream.
//!
//! Each tick:
//! 1. Ask the adapter for work after the cursor and fetch it as one batch
//! 2. "No new data" is skipped silently
//! 3. Any other error is emitted once as an item; the cursor stays put
//! 4. Documents are emitted in order, each send waiting for channel capacity
//! 5. The cursor moves to the last identifier once the whole batch is handed off
//!
//! Adapter failures never stop the engine. Only cancellation does, or the
//! consumer dropping the stream.

mod item;
mod stream;

pub use item::{EngineState, StreamItem, TickOutcome};
pub use stream::FeedStream;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::delivery::DeliveryAdapter;
use crate::diagnostics::{Diagnostics, NoopDiagnostics};
use crate::error::{ConfigError, FeedError};

type Batch<T> = (Vec<String>, Vec<T>);

/// Polls one delivery adapter on an interval and emits what it finds.
pub struct SyncEngine<A: DeliveryAdapter> {
    adapter: A,
    config: EngineConfig,
    cursor: watch::Sender<String>,
    state: watch::Sender<EngineState>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl<A: DeliveryAdapter> SyncEngine<A> {
    /// Create an engine. Invalid configuration fails here, before any
    /// polling starts.
    pub fn new(adapter: A, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if let Some(min) = adapter.min_interval()
            && config.interval < min
        {
            warn!(
                adapter = adapter.name(),
                interval_ms = config.interval.as_millis() as u64,
                min_ms = min.as_millis() as u64,
                "Poll interval is shorter than the source allows; expect rate limiting"
            );
        }

        let (cursor, _) = watch::channel(String::new());
        let (state, _) = watch::channel(EngineState::Idle);
        Ok(Self {
            adapter,
            config,
            cursor,
            state,
            diagnostics: Arc::new(NoopDiagnostics),
        })
    }

    /// Resume after `cursor`. Empty means from the beginning.
    pub fn with_cursor(self, cursor: impl Into<String>) -> Self {
        self.cursor.send_replace(cursor.into());
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn cursor(&self) -> String {
        self.cursor.borrow().clone()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Run the engine on a background task.
    pub fn spawn(self) -> FeedStream<A::Document> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let cancel = CancellationToken::new();
        let state = self.state.subscribe();
        let cursor = self.cursor.subscribe();
        let handle = tokio::spawn(self.run(tx, cancel.clone()));
        FeedStream::new(ReceiverStream::new(rx), cancel, state, cursor, handle)
    }

    async fn run(self, tx: mpsc::Sender<StreamItem<A::Document>>, cancel: CancellationToken) {
        info!(
            adapter = self.adapter.name(),
            interval_secs = self.config.interval.as_secs_f64(),
            cursor = %self.cursor(),
            "Feed sync started"
        );

        let mut tick = tokio::time::interval(self.config.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // First tick fires immediately
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tx.closed() => break,
                _ = tick.tick() => {}
            }

            if self.tick(&tx, &cancel).await == TickOutcome::Cancelled {
                break;
            }
        }

        self.state.send_replace(EngineState::Terminated);
        info!(adapter = self.adapter.name(), cursor = %self.cursor(), "Feed sync stopped");
    }

    /// Run a single tick: discover, fetch, emit, advance.
    pub async fn tick(
        &self,
        tx: &mpsc::Sender<StreamItem<A::Document>>,
        cancel: &CancellationToken,
    ) -> TickOutcome {
        self.state.send_replace(EngineState::Polling);
        let outcome = self.poll(tx, cancel).await;
        self.state.send_replace(match outcome {
            TickOutcome::Cancelled => EngineState::Terminated,
            _ => EngineState::Idle,
        });
        self.diagnostics.tick(&outcome);
        outcome
    }

    async fn poll(
        &self,
        tx: &mpsc::Sender<StreamItem<A::Document>>,
        cancel: &CancellationToken,
    ) -> TickOutcome {
        let cursor = self.cursor();
        let fetched = self.fetch_new(&cursor).await;

        // In-flight work is never aborted, only discarded.
        if cancel.is_cancelled() {
            debug!(adapter = self.adapter.name(), "Discarding poll result after cancellation");
            return TickOutcome::Cancelled;
        }

        let (ids, docs) = match fetched {
            Ok(Some(batch)) => batch,
            Ok(None) | Err(FeedError::NoNewData(_)) => {
                debug!(adapter = self.adapter.name(), "No new feed data");
                return TickOutcome::NoNewData;
            }
            Err(error) => {
                warn!(
                    adapter = self.adapter.name(),
                    kind = error.kind(),
                    error = %error,
                    "Feed poll failed"
                );
                if !self.emit(tx, cancel, StreamItem::failed(error.clone())).await {
                    return TickOutcome::Cancelled;
                }
                return TickOutcome::Failed(error);
            }
        };

        let items = docs.len();
        for (id, doc) in ids.iter().zip(docs) {
            if !self.emit(tx, cancel, StreamItem::document(id.as_str(), doc)).await {
                return TickOutcome::Cancelled;
            }
        }

        let last = ids.last().cloned().unwrap_or_default();
        self.cursor.send_replace(last.clone());
        debug!(adapter = self.adapter.name(), items, cursor = %last, "Delivered feed batch");

        if self.config.purge_delivered
            && let Err(e) = self.adapter.delete_batch(&ids).await
        {
            warn!(adapter = self.adapter.name(), error = %e, "Failed to purge delivered items");
        }

        TickOutcome::Delivered {
            items,
            cursor: last,
        }
    }

    async fn fetch_new(&self, cursor: &str) -> Result<Option<Batch<A::Document>>, FeedError> {
        let ids = self.adapter.discover(cursor).await?;
        if ids.is_empty() {
            return Ok(None);
        }
        let docs = self.adapter.fetch_batch(&ids).await?;
        if docs.len() != ids.len() {
            return Err(FeedError::Transport(format!(
                "adapter returned {} documents for {} items",
                docs.len(),
                ids.len()
            )));
        }
        Ok(Some((ids, docs)))
    }

    /// Hand one item to the consumer. `false` if cancelled or the consumer
    /// is gone.
    async fn emit(
        &self,
        tx: &mpsc::Sender<StreamItem<A::Document>>,
        cancel: &CancellationToken,
        item: StreamItem<A::Document>,
    ) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = tx.send(item) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    use crate::delivery::{DirectoryAdapter, MemoryDirectory};
    use crate::document::BetData;
    use crate::envelope::NO_NEW_DATA_MESSAGE;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    /// Mailbox stand-in that replays scripted fetch results.
    struct ScriptedMailbox {
        script: Mutex<VecDeque<Result<String, FeedError>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedMailbox {
        fn new(script: Vec<Result<String, FeedError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DeliveryAdapter for ScriptedMailbox {
        type Document = String;

        fn name(&self) -> &str {
            "scripted"
        }

        async fn discover(&self, _cursor: &str) -> Result<Vec<String>, FeedError> {
            Ok(vec![String::new()])
        }

        async fn fetch_batch(&self, _ids: &[String]) -> Result<Vec<String>, FeedError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(FeedError::NoNewData(NO_NEW_DATA_MESSAGE.into())))
                .map(|doc| vec![doc])
        }

        async fn delete_batch(&self, _ids: &[String]) -> Result<(), FeedError> {
            Ok(())
        }
    }

    /// Adapter whose fetch parks until released.
    struct GatedDirectory {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl DeliveryAdapter for GatedDirectory {
        type Document = String;

        fn name(&self) -> &str {
            "gated"
        }

        async fn discover(&self, _cursor: &str) -> Result<Vec<String>, FeedError> {
            Ok(vec!["a".to_string()])
        }

        async fn fetch_batch(&self, _ids: &[String]) -> Result<Vec<String>, FeedError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(vec!["doc-a".to_string()])
        }

        async fn delete_batch(&self, _ids: &[String]) -> Result<(), FeedError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct TickRecorder {
        outcomes: Mutex<Vec<TickOutcome>>,
    }

    impl Diagnostics for TickRecorder {
        fn envelope(&self, _source: &str, _bytes: &[u8]) {}

        fn tick(&self, outcome: &TickOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    fn doc(kind: &str) -> Vec<u8> {
        format!(r#"<BetradarBetData DocumentType="{kind}"/>"#).into_bytes()
    }

    fn directory(names: &[&str]) -> Arc<MemoryDirectory> {
        let dir = Arc::new(MemoryDirectory::new());
        for (i, name) in names.iter().enumerate() {
            dir.insert(*name, Utc.timestamp_opt(i as i64 * 60, 0).unwrap(), doc(name));
        }
        dir
    }

    fn fast() -> EngineConfig {
        EngineConfig::directory().with_interval(Duration::from_millis(20))
    }

    fn sources<T>(items: &[StreamItem<T>]) -> Vec<&str> {
        items.iter().map(|i| i.source.as_str()).collect()
    }

    #[tokio::test]
    async fn tick_emits_missing_files_and_advances_cursor() {
        let adapter = DirectoryAdapter::new(directory(&["a", "b", "c", "d"]));
        let engine = SyncEngine::new(adapter, fast()).unwrap().with_cursor("b");
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let outcome = engine.tick(&tx, &cancel).await;
        assert_eq!(
            outcome,
            TickOutcome::Delivered {
                items: 2,
                cursor: "d".into()
            }
        );
        assert_eq!(engine.cursor(), "d");
        assert_eq!(engine.state(), EngineState::Idle);

        let first: StreamItem<BetData> = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.document_ref().unwrap().document_type, "c");
        assert_eq!(second.document_ref().unwrap().document_type, "d");
        assert_eq!(sources(&[first, second]), ["c", "d"]);
        assert!(rx.try_recv().is_err());

        // Nothing new on the next tick.
        assert_eq!(engine.tick(&tx, &cancel).await, TickOutcome::NoNewData);
        assert_eq!(engine.cursor(), "d");
    }

    #[tokio::test]
    async fn no_new_data_is_silent() {
        let adapter = ScriptedMailbox::new(vec![]);
        let recorder = Arc::new(TickRecorder::default());
        let engine = SyncEngine::new(adapter, fast())
            .unwrap()
            .with_diagnostics(recorder.clone());
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            assert_eq!(engine.tick(&tx, &cancel).await, TickOutcome::NoNewData);
            assert_eq!(engine.state(), EngineState::Idle);
            assert_eq!(engine.cursor(), "");
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.adapter().fetches.load(Ordering::SeqCst), 5);
        assert_eq!(recorder.outcomes.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn errors_are_emitted_once_without_moving_cursor() {
        let dir = directory(&["a", "b"]);
        dir.set_available(false);
        let engine = SyncEngine::new(DirectoryAdapter::new(Arc::clone(&dir)), fast()).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let outcome = engine.tick(&tx, &cancel).await;
        assert!(matches!(outcome, TickOutcome::Failed(FeedError::Transport(_))));
        let item = rx.recv().await.unwrap();
        assert!(item.is_error());
        assert_eq!(item.source, "");
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.cursor(), "");
        assert_eq!(engine.state(), EngineState::Idle);

        // Recovers on the next tick.
        dir.set_available(true);
        assert!(matches!(
            engine.tick(&tx, &cancel).await,
            TickOutcome::Delivered { items: 2, .. }
        ));
        assert_eq!(engine.cursor(), "b");
    }

    #[tokio::test]
    async fn control_messages_and_documents_interleave() {
        let adapter = ScriptedMailbox::new(vec![
            Err(FeedError::RateLimited("Too frequent download".into())),
            Ok("doc-1".into()),
            Err(FeedError::NoNewData(NO_NEW_DATA_MESSAGE.into())),
            Err(FeedError::UnknownControlMessage("Invalid key".into())),
            Ok("doc-2".into()),
        ]);
        let engine = SyncEngine::new(adapter, fast()).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            engine.tick(&tx, &cancel).await;
        }
        drop(tx);

        let mut results = Vec::new();
        while let Some(item) = rx.recv().await {
            results.push(item.result);
        }
        assert_eq!(
            results,
            vec![
                Err(FeedError::RateLimited("Too frequent download".into())),
                Ok("doc-1".to_string()),
                Err(FeedError::UnknownControlMessage("Invalid key".into())),
                Ok("doc-2".to_string()),
            ]
        );
        assert_eq!(engine.cursor(), "");
    }

    #[tokio::test]
    async fn spawned_stream_follows_new_files() {
        let dir = directory(&["a", "b", "c", "d"]);
        let engine = SyncEngine::new(DirectoryAdapter::new(Arc::clone(&dir)), fast())
            .unwrap()
            .with_cursor("b");
        let mut stream = engine.spawn();

        let c = timeout(TEST_TIMEOUT, stream.next()).await.unwrap().unwrap();
        let d = timeout(TEST_TIMEOUT, stream.next()).await.unwrap().unwrap();
        assert_eq!(sources(&[c, d]), ["c", "d"]);

        dir.insert("e", Utc.timestamp_opt(3600, 0).unwrap(), doc("e"));
        let e = timeout(TEST_TIMEOUT, stream.next()).await.unwrap().unwrap();
        assert_eq!(e.source, "e");

        stream.cancel();
        assert!(timeout(TEST_TIMEOUT, stream.next()).await.unwrap().is_none());
        assert_eq!(stream.state(), EngineState::Terminated);
        assert_eq!(stream.cursor(), "e");
    }

    #[tokio::test]
    async fn slow_consumer_throttles_without_losing_items() {
        let dir = directory(&["a", "b", "c"]);
        let engine = SyncEngine::new(DirectoryAdapter::new(Arc::clone(&dir)), fast()).unwrap();
        let mut stream = engine.spawn();

        let first = timeout(TEST_TIMEOUT, stream.next()).await.unwrap().unwrap();
        assert_eq!(first.source, "a");
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Batch not fully handed off yet.
        assert_eq!(stream.cursor(), "");
        let sessions_while_blocked = dir.sessions();

        let rest: Vec<_> = timeout(TEST_TIMEOUT, (&mut stream).take(2).collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(sources(&rest), ["b", "c"]);
        assert_eq!(sessions_while_blocked, 2);

        stream.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_while_blocked_does_not_advance_cursor() {
        let dir = directory(&["a", "b", "c"]);
        let engine = SyncEngine::new(DirectoryAdapter::new(dir), fast()).unwrap();
        let cursor = engine.cursor.subscribe();
        let stream = engine.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(stream.state(), EngineState::Polling);
        let token = stream.cancellation_token();
        token.cancel();

        timeout(TEST_TIMEOUT, stream.shutdown()).await.unwrap().unwrap();
        assert_eq!(*cursor.borrow(), "");
    }

    #[tokio::test]
    async fn cancel_during_fetch_discards_result() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let adapter = GatedDirectory {
            started: Arc::clone(&started),
            release: Arc::clone(&release),
        };
        let engine = SyncEngine::new(adapter, fast()).unwrap();
        let cursor = engine.cursor.subscribe();
        let mut stream = engine.spawn();

        timeout(TEST_TIMEOUT, started.notified()).await.unwrap();
        assert_eq!(stream.state(), EngineState::Polling);
        stream.cancel();
        release.notify_one();

        assert!(timeout(TEST_TIMEOUT, stream.next()).await.unwrap().is_none());
        assert_eq!(stream.state(), EngineState::Terminated);
        assert_eq!(*cursor.borrow(), "");
    }

    #[tokio::test]
    async fn stored_no_data_envelope_is_reported() {
        let dir = directory(&["b"]);
        dir.insert(
            "a",
            Utc.timestamp_opt(-60, 0).unwrap(),
            format!("<error>{NO_NEW_DATA_MESSAGE}</error>").into_bytes(),
        );
        let engine = SyncEngine::new(DirectoryAdapter::new(dir), fast()).unwrap();
        let (tx, mut rx) = mpsc::channel(8);

        let outcome = engine.tick(&tx, &CancellationToken::new()).await;
        assert!(matches!(
            outcome,
            TickOutcome::Failed(FeedError::UnknownControlMessage(_))
        ));
        assert!(rx.recv().await.unwrap().is_error());
        assert_eq!(engine.cursor(), "");
    }

    #[tokio::test]
    async fn join_releases_the_stream() {
        let engine = SyncEngine::new(ScriptedMailbox::new(vec![]), fast()).unwrap();
        let stream = engine.spawn();
        timeout(TEST_TIMEOUT, stream.join()).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropped_stream_stops_engine() {
        let engine = SyncEngine::new(ScriptedMailbox::new(vec![]), fast()).unwrap();
        let state = engine.state.subscribe();
        let stream = engine.spawn();
        drop(stream);

        let mut state = state;
        timeout(TEST_TIMEOUT, state.wait_for(|s| s.is_terminal()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn purge_removes_delivered_files() {
        let dir = directory(&["a", "b"]);
        let config = EngineConfig {
            purge_delivered: true,
            ..fast()
        };
        let engine = SyncEngine::new(DirectoryAdapter::new(Arc::clone(&dir)), config).unwrap();
        let (tx, _rx) = mpsc::channel(8);

        engine.tick(&tx, &CancellationToken::new()).await;
        assert!(!dir.contains("a"));
        assert!(!dir.contains("b"));
    }

    #[tokio::test]
    async fn rotated_cursor_replays_directory() {
        let engine = SyncEngine::new(DirectoryAdapter::new(directory(&["c", "d"])), fast())
            .unwrap()
            .with_cursor("a");
        let (tx, mut rx) = mpsc::channel(8);

        engine.tick(&tx, &CancellationToken::new()).await;
        assert_eq!(rx.recv().await.unwrap().source, "c");
        assert_eq!(rx.recv().await.unwrap().source, "d");
    }

    #[test]
    fn invalid_config_fails_construction() {
        let config = EngineConfig::default().with_interval(Duration::ZERO);
        assert!(SyncEngine::new(ScriptedMailbox::new(vec![]), config).is_err());
    }
}
