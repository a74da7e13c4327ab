//! Consumer side of a running sync engine.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::engine::item::{EngineState, StreamItem};

/// Ordered stream of feed items produced by a background sync task.
///
/// Dropping the stream stops the task at its next wake-up.
pub struct FeedStream<T> {
    items: ReceiverStream<StreamItem<T>>,
    cancel: CancellationToken,
    state: watch::Receiver<EngineState>,
    cursor: watch::Receiver<String>,
    handle: JoinHandle<()>,
}

impl<T> FeedStream<T> {
    pub(crate) fn new(
        items: ReceiverStream<StreamItem<T>>,
        cancel: CancellationToken,
        state: watch::Receiver<EngineState>,
        cursor: watch::Receiver<String>,
        handle: JoinHandle<()>,
    ) -> Self {
        Self {
            items,
            cancel,
            state,
            cursor,
            handle,
        }
    }

    /// Request cancellation. Items already queued can still be read.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this stream when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Last fully delivered identifier. Persist this to resume after a
    /// restart.
    pub fn cursor(&self) -> String {
        self.cursor.borrow().clone()
    }

    /// Wait for the background task to finish.
    ///
    /// Releases the item stream, so an engine that was not cancelled stops
    /// at its next wake-up.
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        drop(self.items);
        self.handle.await
    }

    /// Cancel and wait for the background task to finish.
    pub async fn shutdown(self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        self.join().await
    }
}

impl<T> Stream for FeedStream<T> {
    type Item = StreamItem<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.items).poll_next(cx)
    }
}
