//! Runs the long-lived processes of a service side by side and shuts them
//! down together.
//!
//! - Every named process receives the same `CancellationToken`
//! - The first process error, SIGINT or SIGTERM cancels the token
//! - Closers run afterwards under a timeout, whatever the outcome
//!
//! # Example
//!
//! ```no_run
//! use tankwatch_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let result = Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await;
//!     std::process::exit(if result.is_ok() { 0 } else { 1 });
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Boxed future returned by processes and closers
pub type BoxedTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process; receives the shared shutdown token
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedTask + Send>;

/// Cleanup executed once all processes have stopped
pub type Closer = Box<dyn FnOnce() -> BoxedTask + Send>;

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
    handle_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Runner with a 10 second closer timeout and signal handling enabled
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
            handle_signals: true,
        }
    }

    /// Adds a named process. If it returns an error, every other process
    /// is cancelled.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(move |token| Box::pin(process(token)))));
        self
    }

    /// Adds a closer. All closers are attempted even if some fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers.push(Box::new(move || Box::pin(closer())));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to stop the runner from a test
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Disable SIGINT/SIGTERM handling
    pub fn without_signal_handlers(mut self) -> Self {
        self.handle_signals = false;
        self
    }

    /// Runs every process until one fails or shutdown is requested, then
    /// runs the closers.
    ///
    /// Returns the first process error, if any.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;
        let mut join_set = JoinSet::new();

        for (name, process) in self.app_processes {
            let process_token = token.clone();
            join_set.spawn(async move {
                debug!(process = %name, "starting process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        if self.handle_signals {
            spawn_signal_handlers(token.clone());
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => {
                    debug!(process = %name, "process completed");
                }
                Ok((name, Err(err))) => {
                    if token.is_cancelled() {
                        warn!(process = %name, error = %format!("{:#}", err), "process failed during shutdown");
                    } else {
                        error!(process = %name, error = %format!("{:#}", err), "process failed");
                        first_error = Some(err.context(format!("process {} failed", name)));
                        token.cancel();
                    }
                }
                Err(join_err) => {
                    error!(error = %join_err, "process panicked");
                    token.cancel();
                }
            }
        }

        Self::run_closers(self.closers, self.closer_timeout).await;

        match first_error {
            Some(err) => {
                error!("runner exiting with error: {:#}", err);
                Err(err)
            }
            None => {
                info!("runner exiting normally");
                Ok(())
            }
        }
    }

    async fn run_closers(closers: Vec<Closer>, closer_timeout: Duration) {
        if closers.is_empty() {
            return;
        }
        info!(timeout = ?closer_timeout, "running closers");

        let mut closer_set = JoinSet::new();
        for closer in closers {
            closer_set.spawn(closer());
        }

        let drained = tokio::time::timeout(closer_timeout, async {
            while let Some(result) = closer_set.join_next().await {
                match result {
                    Ok(Ok(())) => debug!("closer completed"),
                    Ok(Err(err)) => error!("closer error: {:#}", err),
                    Err(err) => error!("closer panicked: {}", err),
                }
            }
        })
        .await;

        if drained.is_err() {
            error!(timeout = ?closer_timeout, "closers timed out");
            closer_set.abort_all();
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => error!("error setting up signal handler: {}", err),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM signal");
                token.cancel();
            }
            Err(err) => error!("error setting up SIGTERM handler: {}", err),
        }
    });
}
