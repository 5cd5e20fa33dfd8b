//! # Supervisor
//!
//! Runs sessions back to back, waiting between them according to `Backoff`.
//!
//! Before each session a delayed reset of the backoff is scheduled for the current
//! wait time. If the session is still alive when the timer fires, the connection is
//! considered stable and the retry counter starts over. The reset is tagged with the
//! session epoch, which advances as soon as a session ends, so a late reset can never
//! clobber a backoff that already counted a newer failure.

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::backoff::Backoff;
use crate::application::session::{SessionOutcome, SessionRunner};
use crate::domain::error::BotError;
use crate::domain::types::ExitStatus;
use crate::strings::logs;

pub struct Supervisor<R> {
    runner: R,
    backoff: Arc<Mutex<Backoff>>,
    epoch: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl<R: SessionRunner> Supervisor<R> {
    pub fn new(runner: R, backoff: Backoff, shutdown: CancellationToken) -> Self {
        Self {
            runner,
            backoff: Arc::new(Mutex::new(backoff)),
            epoch: Arc::new(AtomicU64::new(0)),
            shutdown,
        }
    }

    #[cfg(test)]
    async fn attempts(&self) -> u32 {
        self.backoff.lock().await.attempts()
    }

    /// Schedules a backoff reset that only applies while session `epoch` is still running.
    fn schedule_reset(&self, after: Duration, epoch: u64) -> JoinHandle<()> {
        let backoff = self.backoff.clone();
        let current = self.epoch.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let mut backoff = backoff.lock().await;
            if current.load(Ordering::SeqCst) == epoch && backoff.attempts() > 0 {
                backoff.reset();
                tracing::info!("{}", logs::BACKOFF_RESET);
            }
        })
    }

    /// Runs until the user interrupts or the retry limit is reached.
    ///
    /// Errors only come from the loop itself, never from a session.
    pub async fn run(&self) -> Result<ExitStatus> {
        tracing::info!("{}", logs::welcome(env!("CARGO_PKG_VERSION")));
        let mut wait = Duration::ZERO;

        loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let reset = self.schedule_reset(wait, epoch);

            let outcome = self.runner.run_session().await;

            self.epoch.fetch_add(1, Ordering::SeqCst);
            reset.abort();
            if let Err(e) = reset.await
                && e.is_panic()
            {
                tracing::error!("Exception in reboot loop: {}", e);
                anyhow::bail!("backoff reset task panicked: {e}");
            }

            match outcome {
                SessionOutcome::Interrupted => return Ok(interrupted()),
                SessionOutcome::Disconnected => tracing::error!("{}", logs::BOT_HALTED),
                SessionOutcome::Failed(err) => tracing::error!("{} ({})", logs::BOT_HALTED, err),
            }

            wait = match self.backoff.lock().await.next() {
                Ok(wait) => wait,
                Err(e) => {
                    tracing::error!("{} ({})", logs::RETRY_LIMIT, e);
                    return Ok(ExitStatus::RetryLimitExceeded);
                }
            };
            tracing::info!("{}", logs::restarting_in(wait.as_secs_f64()));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.shutdown.cancelled() => return Ok(interrupted()),
            }
            tracing::info!("{}", logs::RESTARTING);
        }
    }
}

fn interrupted() -> ExitStatus {
    tracing::info!("{} ({})", logs::INTERRUPTED, BotError::UserInterrupt);
    ExitStatus::Ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Replays a fixed list of (session duration, outcome); fails instantly afterwards.
    struct ScriptedRunner {
        script: std::sync::Mutex<Vec<(Duration, SessionOutcome)>>,
        runs: AtomicUsize,
    }

    impl ScriptedRunner {
        fn new(mut script: Vec<(Duration, SessionOutcome)>) -> Self {
            script.reverse();
            Self {
                script: std::sync::Mutex::new(script),
                runs: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl SessionRunner for ScriptedRunner {
        async fn run_session(&self) -> SessionOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop();
            match next {
                Some((duration, outcome)) => {
                    tokio::time::sleep(duration).await;
                    outcome
                }
                None => SessionOutcome::Failed("connection refused".to_string()),
            }
        }
    }

    fn backoff(max_attempts: u32) -> Backoff {
        Backoff::new(3.0, 1.58, max_attempts).with_jitter(|| 0.0)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_limit_terminates() {
        let supervisor = Supervisor::new(ScriptedRunner::failing(), backoff(3), CancellationToken::new());
        let started = tokio::time::Instant::now();

        assert_eq!(supervisor.run().await.unwrap(), ExitStatus::RetryLimitExceeded);
        // One initial run plus one per allowed retry
        assert_eq!(supervisor.runner.runs.load(Ordering::SeqCst), 4);
        assert_eq!(supervisor.attempts().await, 3);

        let waited = started.elapsed().as_secs_f64();
        let expected = 3.0 + 3.0 * 1.58 + 3.0 * 1.58 * 1.58;
        assert!((waited - expected).abs() < 0.01, "waited {waited}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_exits_without_retry() {
        let runner = ScriptedRunner::new(vec![(Duration::from_secs(5), SessionOutcome::Interrupted)]);
        let supervisor = Supervisor::new(runner, backoff(3), CancellationToken::new());

        assert_eq!(supervisor.run().await.unwrap(), ExitStatus::Ok);
        assert_eq!(supervisor.runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_during_retry_wait() {
        let shutdown = CancellationToken::new();
        let supervisor = Supervisor::new(ScriptedRunner::failing(), backoff(10), shutdown.clone());
        shutdown.cancel();

        assert_eq!(supervisor.run().await.unwrap(), ExitStatus::Ok);
        assert_eq!(supervisor.runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_session_resets_backoff() {
        let runner = ScriptedRunner::new(vec![
            (Duration::ZERO, SessionOutcome::Failed("a".to_string())),
            (Duration::ZERO, SessionOutcome::Failed("b".to_string())),
            // Outlives the pending wait time, so it counts as stable
            (Duration::from_secs(600), SessionOutcome::Disconnected),
            (Duration::ZERO, SessionOutcome::Interrupted),
        ]);
        let supervisor = Supervisor::new(runner, backoff(3), CancellationToken::new());

        assert_eq!(supervisor.run().await.unwrap(), ExitStatus::Ok);
        assert_eq!(supervisor.runner.runs.load(Ordering::SeqCst), 4);
        // Reset to 0 during the long session, then one failure counted after it
        assert_eq!(supervisor.attempts().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_sessions_do_not_reset() {
        let runner = ScriptedRunner::new(vec![
            (Duration::ZERO, SessionOutcome::Failed("a".to_string())),
            // Shorter than the 3s wait before it
            (Duration::from_secs(1), SessionOutcome::Disconnected),
            (Duration::ZERO, SessionOutcome::Interrupted),
        ]);
        let supervisor = Supervisor::new(runner, backoff(5), CancellationToken::new());

        assert_eq!(supervisor.run().await.unwrap(), ExitStatus::Ok);
        assert_eq!(supervisor.attempts().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reset_ignored_after_session_ends() {
        let supervisor = Supervisor::new(ScriptedRunner::failing(), backoff(5), CancellationToken::new());
        {
            let mut b = supervisor.backoff.lock().await;
            b.next().unwrap();
            b.next().unwrap();
        }
        let reset = supervisor.schedule_reset(Duration::from_secs(1), 0);
        // The session this reset belonged to has already ended
        supervisor.epoch.fetch_add(1, Ordering::SeqCst);
        reset.await.unwrap();
        assert_eq!(supervisor.attempts().await, 2);
    }
}
