//! # Connection Session
//!
//! One connect → serve → disconnect cycle.
//!
//! Chat events are handled on tasks inside a `JoinSet`. Messages from the same sender
//! go through a single worker task, so they are handled in arrival order; other events
//! get a task of their own. Whatever ends the session, the teardown is the same:
//! close the connection, abort and await every task still in flight, then persist the
//! runtime state.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};

use crate::application::context::BotContext;
use crate::domain::error::BotError;
use crate::domain::traits::ChatTransport;
use crate::domain::types::{ChatEvent, UserId};
use crate::strings::logs;

/// Receives every event of a session.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: ChatEvent);
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The chat service closed the connection.
    Disconnected,
    /// The user asked the bot to stop.
    Interrupted,
    /// Connection or protocol failure; worth a retry.
    Failed(String),
}

/// Something the supervisor can run repeatedly.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run_session(&self) -> SessionOutcome;
}

/// Handler tasks of one session.
struct Dispatcher {
    handler: Arc<dyn EventHandler>,
    tasks: JoinSet<()>,
    live: HashSet<Id>,
    queues: HashMap<UserId, mpsc::UnboundedSender<ChatEvent>>,
}

impl Dispatcher {
    fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            handler,
            tasks: JoinSet::new(),
            live: HashSet::new(),
            queues: HashMap::new(),
        }
    }

    fn dispatch(&mut self, event: ChatEvent) {
        let Some(sender) = event.sender().map(str::to_string) else {
            let handler = self.handler.clone();
            let task = self.tasks.spawn(async move { handler.handle(event).await });
            self.live.insert(task.id());
            return;
        };

        // A worker whose receiver is gone (it panicked) is replaced
        let event = match self.queues.get(&sender) {
            Some(queue) => match queue.send(event) {
                Ok(()) => return,
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _ = tx.send(event);
        let handler = self.handler.clone();
        let task = self.tasks.spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.handle(event).await;
            }
        });
        self.live.insert(task.id());
        self.queues.insert(sender, tx);
    }

    fn reap(&mut self, joined: Result<(Id, ()), JoinError>) {
        match joined {
            Ok((id, ())) => {
                self.live.remove(&id);
            }
            Err(e) => {
                self.live.remove(&e.id());
                if e.is_panic() {
                    tracing::error!("Event handler panicked: {}", e);
                }
            }
        }
    }
}

pub struct Session {
    ctx: Arc<BotContext>,
    transport: Arc<dyn ChatTransport>,
    handler: Arc<dyn EventHandler>,
    shutdown_timeout: Duration,
}

impl Session {
    pub fn new(ctx: Arc<BotContext>, transport: Arc<dyn ChatTransport>, handler: Arc<dyn EventHandler>) -> Self {
        let shutdown_timeout = Duration::from_secs(ctx.config.supervisor.shutdown_timeout_secs);
        Self {
            ctx,
            transport,
            handler,
            shutdown_timeout,
        }
    }

    pub async fn run(&self) -> SessionOutcome {
        let mut dispatcher = Dispatcher::new(self.handler.clone());

        let outcome = match self.serve(&mut dispatcher).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = format!("{e:#}");
                tracing::error!("{}", logs::session_fault(&err));
                SessionOutcome::Failed(err)
            }
        };

        tracing::debug!("{}", logs::SESSION_CLOSING);
        if let Err(e) = self.transport.disconnect().await {
            tracing::warn!("Error while closing connection: {:#}", e);
        }
        tracing::info!("{}", logs::SESSION_CLOSED);

        self.cancel_pending(&mut dispatcher).await;

        if let Err(e) = self.ctx.persist().await {
            tracing::error!("{}", logs::state_write_failed(&format!("{e:#}")));
        }
        outcome
    }

    async fn serve(&self, dispatcher: &mut Dispatcher) -> Result<SessionOutcome> {
        tracing::info!("{}", logs::SESSION_CONNECTING);
        let mut events = self
            .transport
            .connect()
            .await
            .context("Failed to connect to chat service")?;

        loop {
            tokio::select! {
                biased;

                _ = self.ctx.shutdown.cancelled() => {
                    tracing::info!("{}", logs::SESSION_INTERRUPTED);
                    return Ok(SessionOutcome::Interrupted);
                }
                Some(joined) = dispatcher.tasks.join_next_with_id(), if !dispatcher.tasks.is_empty() => {
                    dispatcher.reap(joined);
                }
                event = events.recv() => match event {
                    None => {
                        tracing::warn!("{}", logs::session_disconnected("event stream closed"));
                        return Ok(SessionOutcome::Disconnected);
                    }
                    Some(ChatEvent::Disconnected { error: Some(err) }) => {
                        return Err(BotError::SessionFault(format!("connection lost: {err}")).into());
                    }
                    Some(ChatEvent::Disconnected { error: None }) => {
                        tracing::warn!("{}", logs::session_disconnected("closed by server"));
                        return Ok(SessionOutcome::Disconnected);
                    }
                    Some(event) => {
                        if matches!(event, ChatEvent::Ready) {
                            tracing::info!("{}", logs::SESSION_READY);
                        }
                        dispatcher.dispatch(event);
                    }
                },
            }
        }
    }

    /// Aborts every in-flight handler and waits for all of them to finish.
    ///
    /// Bounded by the shutdown timeout. Tasks that ignore the abort past that bound are
    /// detached and logged by id; they are the only ones that outlive the session.
    async fn cancel_pending(&self, dispatcher: &mut Dispatcher) {
        dispatcher.queues.clear();
        if dispatcher.tasks.is_empty() {
            return;
        }
        tracing::debug!("{}", logs::SESSION_CANCELLING);
        dispatcher.tasks.abort_all();

        let drain = async {
            while let Some(joined) = dispatcher.tasks.join_next_with_id().await {
                dispatcher.reap(joined);
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            tracing::warn!("{}", logs::cancel_timeout(dispatcher.tasks.len()));
            for id in &dispatcher.live {
                tracing::warn!("{}", logs::task_detached(&id.to_string()));
            }
            dispatcher.tasks.detach_all();
            dispatcher.live.clear();
        }
    }
}

#[async_trait]
impl SessionRunner for Session {
    async fn run_session(&self) -> SessionOutcome {
        self.run().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::context::tests::test_config;
    use crate::application::router::CommandRouter;
    use crate::application::router::tests::message;
    use crate::application::state::RuntimeState;
    use crate::application::wizard_manager::tests::RecordingChat;
    use crate::domain::traits::ChatProvider;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Transport whose event stream is driven by the test.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub feed: StdMutex<Option<mpsc::Receiver<ChatEvent>>>,
        pub connects: AtomicUsize,
        pub disconnects: AtomicUsize,
        pub refuse: AtomicBool,
    }

    impl FakeTransport {
        pub fn with_feed() -> (Arc<Self>, mpsc::Sender<ChatEvent>) {
            let (tx, rx) = mpsc::channel(16);
            let transport = Arc::new(Self::default());
            *transport.feed.lock().unwrap() = Some(rx);
            (transport, tx)
        }
    }

    #[async_trait]
    impl ChatProvider for FakeTransport {
        async fn send_message(&self, _target: &str, _content: &str) -> Result<String, String> {
            Ok("$sent".to_string())
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn connect(&self) -> Result<mpsc::Receiver<ChatEvent>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            self.feed
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("no event feed"))
        }

        async fn disconnect(&self) -> Result<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sets its flag when dropped, i.e. when the owning task is cancelled.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// Handler that never finishes.
    struct StuckHandler {
        started: Arc<AtomicUsize>,
        dropped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl EventHandler for StuckHandler {
        async fn handle(&self, _event: ChatEvent) {
            let _flag = DropFlag(self.dropped.clone());
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
    }

    /// Counts events once the wrapped handler is done with them.
    struct Counting {
        inner: Arc<dyn EventHandler>,
        handled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventHandler for Counting {
        async fn handle(&self, event: ChatEvent) {
            self.inner.handle(event).await;
            self.handled.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn message_event() -> ChatEvent {
        ChatEvent::MessageCreated(message("@u:x", "!dm", "hi"))
    }

    fn context(transport: Arc<FakeTransport>, state: RuntimeState) -> Arc<BotContext> {
        Arc::new(BotContext::init(test_config(), transport, state))
    }

    async fn wait_for(counter: &AtomicUsize, n: usize) {
        while counter.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_pending_handlers_cancelled_on_disconnect() {
        let (transport, tx) = FakeTransport::with_feed();
        let ctx = context(transport.clone(), RuntimeState::in_memory());
        let started = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(StuckHandler {
            started: started.clone(),
            dropped: dropped.clone(),
        });
        let session = Session::new(ctx, transport.clone(), handler);

        let run = tokio::spawn(async move { session.run().await });
        tx.send(message_event()).await.unwrap();
        wait_for(&started, 1).await;
        tx.send(ChatEvent::Disconnected { error: None }).await.unwrap();

        assert_eq!(run.await.unwrap(), SessionOutcome::Disconnected);
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_disconnect_persists_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let (transport, tx) = FakeTransport::with_feed();
        let ctx = context(transport.clone(), RuntimeState::load(&path));
        let handler = Arc::new(StuckHandler {
            started: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        });
        tx.send(ChatEvent::Disconnected { error: None }).await.unwrap();

        let outcome = Session::new(ctx, transport, handler).run().await;
        assert_eq!(outcome, SessionOutcome::Disconnected);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_interrupt_reported_distinctly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let (transport, _tx) = FakeTransport::with_feed();
        let ctx = context(transport.clone(), RuntimeState::load(&path));
        let handler = Arc::new(StuckHandler {
            started: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        });
        ctx.shutdown.cancel();

        let outcome = Session::new(ctx, transport.clone(), handler).run().await;
        assert_eq!(outcome, SessionOutcome::Interrupted);
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_protocol_error_is_failure_not_panic() {
        let (transport, tx) = FakeTransport::with_feed();
        let ctx = context(transport.clone(), RuntimeState::in_memory());
        let handler = Arc::new(StuckHandler {
            started: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        });
        tx.send(ChatEvent::Disconnected {
            error: Some("bad gateway".to_string()),
        })
        .await
        .unwrap();

        let outcome = Session::new(ctx, transport, handler).run().await;
        assert!(matches!(outcome, SessionOutcome::Failed(ref e) if e.contains("bad gateway")));
    }

    #[tokio::test]
    async fn test_connect_failure_still_persists_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let (transport, _tx) = FakeTransport::with_feed();
        transport.refuse.store(true, Ordering::SeqCst);
        let ctx = context(transport.clone(), RuntimeState::load(&path));
        let handler = Arc::new(StuckHandler {
            started: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicBool::new(false)),
        });

        let outcome = Session::new(ctx, transport, handler).run().await;
        assert!(matches!(outcome, SessionOutcome::Failed(ref e) if e.contains("connection refused")));
        assert!(path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_answers_from_one_user_handled_in_order() {
        const USERS: usize = 50;
        let (transport, tx) = FakeTransport::with_feed();
        let chat = Arc::new(RecordingChat::default());
        let ctx = Arc::new(BotContext::init(test_config(), chat, RuntimeState::in_memory()));
        let router = CommandRouter::load(ctx.clone(), &["projects".to_string()]).unwrap();
        let handled = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Counting {
            inner: Arc::new(router),
            handled: handled.clone(),
        });

        let users: Vec<String> = (0..USERS).map(|i| format!("@u{i}:x")).collect();
        for user in &users {
            ctx.wizards.create_new_wizard(user, Utc::now()).await.unwrap();
        }

        let session = Session::new(ctx.clone(), transport, handler);
        let run = tokio::spawn(async move { session.run().await });
        for user in &users {
            for body in ["My Book", "fantasy"] {
                tx.send(ChatEvent::MessageCreated(message(user, "!dm", body))).await.unwrap();
            }
        }
        wait_for(&handled, USERS * 2).await;
        tx.send(ChatEvent::Disconnected { error: None }).await.unwrap();
        assert_eq!(run.await.unwrap(), SessionOutcome::Disconnected);

        for user in &users {
            let (_, wizard) = ctx.wizards.get_wizard_for(user).await.unwrap();
            assert_eq!(wizard.get("title").unwrap().as_str(), "My Book", "{user}");
            assert_eq!(wizard.get("genre").unwrap().as_str(), "Fantasy", "{user}");
        }
    }
}
