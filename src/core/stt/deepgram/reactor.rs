//! The reactor task that owns the WebSocket.
//!
//! ```text
//!  AudioSender::send ──▶ mpsc (bounded) ──┐
//!          │                              ▼
//!          └──── Waker::wake ──────▶ ┌──────────┐ ──▶ binary frames ──▶ service
//!                                    │ Reactor  │
//!  result sink ◀── parser ◀── assembler ◀─────┘ ◀── text frames ◀── service
//! ```
//!
//! All reads and writes happen on the reactor task. Other tasks only hand
//! frames over the channel and wake the loop.

use std::future::Future;
use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::poll_fn;
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, info, warn};

use super::assembler::{ReadEvent, ReceivePath};
use super::client::log_transcript;
use super::connection::{Connection, WsStream};
use super::messages::TranscriptionMessage;
use crate::core::stt::base::{
    STTConnectionState, STTError, STTErrorCallback, STTResultCallback, STTStats,
};

// =============================================================================
// Waker
// =============================================================================

/// Forces an immediate reactor iteration.
///
/// A wake issued while the reactor is busy is stored and consumed on the next
/// iteration, so it is never lost.
#[derive(Debug, Clone, Default)]
pub struct Waker {
    notify: Arc<Notify>,
}

impl Waker {
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

// =============================================================================
// EventLoop
// =============================================================================

/// Handle to the task running a reactor loop.
///
/// [`EventLoop::stop`] is the only way to end the loop early: it signals the
/// task and waits for it to finish. Dropping the handle signals without
/// waiting.
#[derive(Debug)]
pub struct EventLoop {
    waker: Waker,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Run `task` on its own tokio task.
    ///
    /// The task receives the loop's [`Waker`] and a stop signal it must
    /// observe between iterations.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(Waker, oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let waker = Waker::default();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(task(waker.clone(), stop_rx));

        Self {
            waker,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn waker(&self) -> Waker {
        self.waker.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the loop and join it.
    ///
    /// Returns `false` if the loop was already stopped by an earlier call.
    pub async fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Err(e) = handle.await {
            warn!("Reactor task ended abnormally: {}", e);
        }
        true
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

/// State shared between the client handle, its senders and the reactor.
pub(crate) struct SessionShared {
    state: RwLock<STTConnectionState>,
    closed: AtomicBool,
    pub(crate) stats: RwLock<STTStats>,
    pub(crate) result_callback: RwLock<Option<STTResultCallback>>,
    pub(crate) error_callback: RwLock<Option<STTErrorCallback>>,
}

impl Default for SessionShared {
    fn default() -> Self {
        Self {
            state: RwLock::new(STTConnectionState::Disconnected),
            closed: AtomicBool::new(false),
            stats: RwLock::new(STTStats::default()),
            result_callback: RwLock::new(None),
            error_callback: RwLock::new(None),
        }
    }
}

impl SessionShared {
    pub(crate) fn state(&self) -> STTConnectionState {
        self.state.read().clone()
    }

    /// Apply `next` if the state machine allows it.
    pub(crate) fn transition(&self, next: STTConnectionState) -> bool {
        let mut state = self.state.write();
        if !state.can_transition_to(&next) {
            debug!("Ignoring state change {:?} -> {:?}", *state, next);
            return false;
        }
        debug!("Connection state {:?} -> {:?}", *state, next);
        if next.is_terminal() {
            self.closed.store(true, Ordering::SeqCst);
        }
        *state = next;
        true
    }

    /// Stop accepting new sends.
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Hand one parsed message to the result sink.
    async fn deliver(&self, message: TranscriptionMessage) {
        self.stats.write().update_with_message(&message);

        let callback = self.result_callback.read().clone();
        match callback {
            Some(callback) => callback(message).await,
            None => log_transcript(&message),
        }
    }

    /// Forward a non-fatal failure to the error callback, if any.
    pub(crate) async fn report_error(&self, error: STTError) {
        let callback = self.error_callback.read().clone();
        if let Some(callback) = callback {
            callback(error).await;
        }
    }
}

// =============================================================================
// Reactor
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReactorSettings {
    pub(crate) write_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) tick: Duration,
    pub(crate) max_reads_per_event: usize,
}

/// Loop body run by an [`EventLoop`]; owns the socket for its whole life.
///
/// Generic over the two socket halves so the loop can be driven without a
/// network peer.
pub(crate) struct Reactor<K = SplitSink<WsStream, Message>, S = SplitStream<WsStream>> {
    sink: K,
    stream: S,
    outbound: mpsc::Receiver<Bytes>,
    receive: ReceivePath,
    shared: Arc<SessionShared>,
    settings: ReactorSettings,
}

impl Reactor {
    pub(crate) fn new(
        connection: Connection,
        outbound: mpsc::Receiver<Bytes>,
        receive: ReceivePath,
        shared: Arc<SessionShared>,
        settings: ReactorSettings,
    ) -> Self {
        let (sink, stream) = connection.stream.split();
        Self::from_parts(sink, stream, outbound, receive, shared, settings)
    }
}

impl<K, S> Reactor<K, S>
where
    K: Sink<Message, Error = WsError> + Unpin,
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    pub(crate) fn from_parts(
        sink: K,
        stream: S,
        outbound: mpsc::Receiver<Bytes>,
        receive: ReceivePath,
        shared: Arc<SessionShared>,
        settings: ReactorSettings,
    ) -> Self {
        Self {
            sink,
            stream,
            outbound,
            receive,
            shared,
            settings,
        }
    }

    pub(crate) async fn run(mut self, waker: Waker, mut stop_rx: oneshot::Receiver<()>) {
        let mut tick = interval(self.settings.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = &mut stop_rx => {
                    self.shutdown().await;
                    return;
                }

                _ = waker.notified() => self.flush_outbound().await,

                _ = tick.tick() => self.flush_outbound().await,

                incoming = self.stream.next() => {
                    if self.on_readable(incoming).await.is_break() {
                        break;
                    }
                }
            }
        }

        // The peer ended the session; dropping `self` releases the socket.
        self.outbound.close();
        info!("Reactor stopped after remote close");
    }

    /// Handle one read-readiness event.
    ///
    /// Frames that are already buffered behind the ready one are read in the
    /// same pass, up to `max_reads_per_event`, before extraction runs.
    async fn on_readable(&mut self, first: Option<Result<Message, WsError>>) -> ControlFlow<()> {
        let mut next = first;
        let mut reads = 0;

        let flow = loop {
            reads += 1;
            match next {
                None => break self.remote_closed(None),
                Some(Ok(message)) => {
                    if let ReadEvent::Closed(frame) = self.receive.ingest(message) {
                        break self.remote_closed(frame);
                    }
                }
                Some(Err(e)) => {
                    if let Some(state) = closed_state(&e) {
                        info!("Connection lost: {}", e);
                        self.shared.mark_closed();
                        self.shared.transition(state);
                        break ControlFlow::Break(());
                    }
                    self.read_failed(e).await;
                }
            }

            if reads >= self.settings.max_reads_per_event {
                break ControlFlow::Continue(());
            }
            match self.stream.next().now_or_never() {
                Some(item) => next = item,
                None => break ControlFlow::Continue(()),
            }
        };

        self.deliver_pending().await;
        flow
    }

    fn remote_closed(&mut self, frame: Option<CloseFrame>) -> ControlFlow<()> {
        info!("Remote closed the connection: {:?}", frame);
        self.shared.mark_closed();
        self.shared.transition(STTConnectionState::Closed);
        ControlFlow::Break(())
    }

    async fn read_failed(&mut self, e: WsError) {
        let error = STTError::ReceiveFailure(e.to_string());
        warn!("{}", error);
        self.shared.stats.write().receive_failures += 1;
        self.shared.report_error(error).await;
    }

    async fn deliver_pending(&mut self) {
        for outcome in self.receive.drain() {
            match outcome {
                Ok(message) => self.shared.deliver(message).await,
                Err(error) => {
                    self.shared.stats.write().parse_failures += 1;
                    self.shared.report_error(error).await;
                }
            }
        }
    }

    /// Write every frame currently queued, in order.
    async fn flush_outbound(&mut self) {
        while let Ok(frame) = self.outbound.try_recv() {
            self.write_frame(frame).await;
        }
    }

    /// Write one audio frame.
    ///
    /// Only the wait for write readiness is bounded by `write_timeout`. A frame
    /// that misses it is dropped before it reaches the socket. Once the sink
    /// accepts a frame it is committed: a stalled flush leaves it buffered for
    /// the next write instead of dropping it.
    async fn write_frame(&mut self, frame: Bytes) {
        let len = frame.len();
        let write_timeout = self.settings.write_timeout;

        let ready = timeout(write_timeout, poll_fn(|cx| self.sink.poll_ready_unpin(cx))).await;
        let reason = match ready {
            Ok(Ok(())) => match self.sink.start_send_unpin(Message::Binary(frame)) {
                Ok(()) => {
                    self.shared.stats.write().record_sent(len);
                    match timeout(write_timeout, self.sink.flush()).await {
                        Ok(Ok(())) => debug!("Sent {} bytes of audio", len),
                        Ok(Err(e)) => warn!("Flush failed after queueing audio: {}", e),
                        Err(_) => debug!("Flush stalled, {} byte frame stays buffered", len),
                    }
                    return;
                }
                Err(e) => format!("Failed to send {len} byte frame: {e}"),
            },
            Ok(Err(e)) => format!("Failed to send {len} byte frame: {e}"),
            Err(_) => format!(
                "Timed out after {}ms waiting to send {len} byte frame",
                write_timeout.as_millis()
            ),
        };

        let error = STTError::SendFailure(reason);
        warn!("{}", error);
        self.shared.stats.write().frames_dropped += 1;
        self.shared.report_error(error).await;
    }

    /// Graceful local shutdown.
    ///
    /// Frames accepted before the stop signal are still written, then a Close
    /// frame is sent and the peer's reply awaited for at most `read_timeout`.
    /// Results that arrive meanwhile are delivered.
    async fn shutdown(mut self) {
        debug!("Reactor stopping");
        self.outbound.close();
        self.flush_outbound().await;

        match timeout(self.settings.write_timeout, self.sink.send(Message::Close(None))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Close frame not sent: {}", e),
            Err(_) => debug!("Timed out sending close frame"),
        }

        let read_timeout = self.settings.read_timeout;
        let close_reply = timeout(read_timeout, async {
            while let Some(Ok(message)) = self.stream.next().await {
                if let ReadEvent::Closed(_) = self.receive.ingest(message) {
                    break;
                }
            }
        })
        .await;
        if close_reply.is_err() {
            debug!("No close reply within {}ms", read_timeout.as_millis());
        }

        self.deliver_pending().await;
        info!("Streaming connection closed");
    }
}

/// The state a read error leaves the connection in, if it closed the socket.
fn closed_state(error: &WsError) -> Option<STTConnectionState> {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Some(STTConnectionState::Closed),
        WsError::Io(e)
            if matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ) =>
        {
            Some(STTConnectionState::Failed(error.to_string()))
        }
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            Some(STTConnectionState::Failed(error.to_string()))
        }
        _ => None,
    }
}
