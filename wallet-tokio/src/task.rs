use std::{
    borrow::Cow,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use futures::{StreamExt, stream::FuturesUnordered};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinHandle},
};
use tracing::{Instrument, debug, error, info, warn};

use crate::notify_once::NotifyOnce;

/// Errors that can occur when joining [`LxTask`]s.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Static task finished prematurely: {name}")]
    PrematureFinish { name: Cow<'static, str> },
    #[error("Some tasks failed to finish on time: {hung_tasks:?}")]
    Hung { hung_tasks: Vec<String> },
}

/// Supervise a set of tasks until shutdown.
///
/// - "static" tasks run for the lifetime of their owner. If one finishes
///   before the shutdown signal, a shutdown is triggered and
///   [`Error::PrematureFinish`] is returned.
/// - "ephemeral" tasks (e.g. a one-off sync run) arrive over `eph_tasks_rx`
///   and may finish at any time.
///
/// After the shutdown signal, waits up to `shutdown_timeout` for every
/// remaining task, returning [`Error::Hung`] with the stragglers' names if
/// some don't finish. Task panics are propagated to the caller.
pub async fn try_join_tasks_and_shutdown(
    static_tasks: Vec<LxTask<()>>,
    mut eph_tasks_rx: mpsc::Receiver<LxTask<()>>,
    mut shutdown: NotifyOnce,
    shutdown_timeout: Duration,
) -> Result<(), Error> {
    let mut static_tasks = static_tasks
        .into_iter()
        .map(LxTask::logged)
        .collect::<FuturesUnordered<_>>();
    let mut eph_tasks = FuturesUnordered::new();
    let mut result = Ok(());

    loop {
        tokio::select! {
            biased;
            () = shutdown.recv() => break,
            Some(task) = eph_tasks_rx.recv() => {
                debug!("Received ephemeral task: {}", task.name());
                eph_tasks.push(task.logged());
            }
            Some(name) = eph_tasks.next() => {
                debug!("Ephemeral task finished: {name}");
            }
            Some(name) = static_tasks.next() => {
                result = Err(Error::PrematureFinish { name });
                break shutdown.send();
            }
        }
    }

    // Pick up any ephemeral tasks that were queued right before shutdown.
    while let Ok(task) = eph_tasks_rx.try_recv() {
        eph_tasks.push(task.logged());
    }

    let mut all_tasks = static_tasks
        .into_iter()
        .chain(eph_tasks)
        .collect::<FuturesUnordered<_>>();

    let deadline = tokio::time::sleep(shutdown_timeout);
    tokio::pin!(deadline);

    while !all_tasks.is_empty() {
        tokio::select! {
            Some(_name) = all_tasks.next() => (),
            () = &mut deadline => {
                let hung_tasks = all_tasks
                    .iter()
                    .map(|task| task.name().to_owned())
                    .collect::<Vec<_>>();
                return Err(Error::Hung { hung_tasks });
            }
        }
    }

    result
}

/// [`try_join_tasks_and_shutdown`], but logs the result instead of returning
/// it. Handy as the body of a supervisor task.
pub async fn join_tasks_and_shutdown(
    name: &str,
    static_tasks: Vec<LxTask<()>>,
    eph_tasks_rx: mpsc::Receiver<LxTask<()>>,
    shutdown: NotifyOnce,
    shutdown_timeout: Duration,
) {
    let result = try_join_tasks_and_shutdown(
        static_tasks,
        eph_tasks_rx,
        shutdown,
        shutdown_timeout,
    )
    .await;

    match result {
        Ok(()) => info!("{name} tasks finished."),
        Err(e) => error!("{name} tasks errored: {e:#}"),
    }
}

/// A named [`tokio::task::JoinHandle`] which propagates panics when awaited.
/// Every bridge task is handed to a supervisor, so it's `#[must_use]`.
#[must_use]
pub struct LxTask<T> {
    task: JoinHandle<T>,
    name: Cow<'static, str>,
}

/// Logs how an [`LxTask`] ended and resolves to its name.
pub struct LoggedLxTask<T>(LxTask<T>);

// --- impl LxTask --- //

impl<T> LxTask<T> {
    /// Spawns a named task inside the current span, so the repo, balance
    /// and sync loops log under the app's span.
    pub fn spawn<F>(
        name: impl Into<Cow<'static, str>>,
        future: F,
    ) -> LxTask<F::Output>
    where
        F: Future<Output = T> + Send + 'static,
        F::Output: Send + 'static,
    {
        let name = name.into();
        debug!("Spawning task: {name}");
        let task = tokio::spawn(future.instrument(tracing::Span::current()));
        LxTask { task, name }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn logged(self) -> LoggedLxTask<T> {
        LoggedLxTask(self)
    }
}

impl<T> Future for LxTask<T> {
    type Output = Result<T, JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.task).poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        Poll::Ready(result.map_err(|join_err| {
            match join_err.try_into_panic() {
                Ok(panic_reason) => {
                    error!("Task '{}' panicked!", self.name());
                    std::panic::resume_unwind(panic_reason)
                }
                Err(join_err) => join_err,
            }
        }))
    }
}

// --- impl LoggedLxTask --- //

impl<T> LoggedLxTask<T> {
    #[inline]
    pub fn name(&self) -> &str {
        self.0.name()
    }
}

impl<T> Future for LoggedLxTask<T> {
    type Output = Cow<'static, str>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx).map(|result| {
            let name = self.0.name.clone();
            match result {
                Ok(_) => info!("Task '{name}' finished"),
                Err(e) if e.is_cancelled() =>
                    warn!("Task '{name}' cancelled: {e:#}"),
                Err(e) => warn!("Task '{name}' failed: {e:#}"),
            }
            name
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn joins_after_shutdown() {
        let shutdown = NotifyOnce::new();
        let (eph_tx, eph_rx) = mpsc::channel(4);

        let mut rx_shutdown = shutdown.clone();
        let static_task = LxTask::spawn("static", async move {
            rx_shutdown.recv().await;
        });
        eph_tx
            .send(LxTask::spawn("eph", async {}))
            .await
            .unwrap();

        let supervisor = tokio::spawn(try_join_tasks_and_shutdown(
            vec![static_task],
            eph_rx,
            shutdown.clone(),
            Duration::from_secs(1),
        ));

        tokio::time::sleep(Duration::from_secs(5)).await;
        shutdown.send();
        supervisor.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn premature_finish_triggers_shutdown() {
        let shutdown = NotifyOnce::new();
        let (_eph_tx, eph_rx) = mpsc::channel(4);

        let task = LxTask::spawn("oops", async {});
        let result = try_join_tasks_and_shutdown(
            vec![task],
            eph_rx,
            shutdown.clone(),
            Duration::from_secs(1),
        )
        .await;

        assert!(matches!(result, Err(Error::PrematureFinish { .. })));
        assert!(shutdown.try_recv());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_tasks_are_named() {
        let shutdown = NotifyOnce::new();
        let (_eph_tx, eph_rx) = mpsc::channel(4);

        let task = LxTask::spawn("stubborn", std::future::pending::<()>());
        shutdown.send();
        let result = try_join_tasks_and_shutdown(
            vec![task],
            eph_rx,
            shutdown,
            Duration::from_secs(1),
        )
        .await;

        match result {
            Err(Error::Hung { hung_tasks }) =>
                assert_eq!(hung_tasks, vec!["stubborn".to_owned()]),
            other => panic!("Unexpected: {other:?}"),
        }
    }
}
