//! SIGINT / SIGTERM handling for long-running commands.
//!
//! The handlers only flip an `AtomicBool`; a tokio task polls it every 50ms
//! and cancels the shared token, so in-flight service calls stop promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Interrupt handling installed for the length of a suggestion run.
///
/// Dropping it hands SIGINT and SIGTERM back to their default behaviour.
/// signal-hook cannot uninstall a handler, so the handler stays and
/// emulates the default action once `restored` is set.
pub struct Shutdown {
    requested: Arc<AtomicBool>,
    restored: Arc<AtomicBool>,
}

impl Shutdown {
    /// Set by the first SIGINT or SIGTERM.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.requested)
    }
}

impl Drop for Shutdown {
    fn drop(&mut self) {
        self.restored.store(true, Ordering::Relaxed);
    }
}

/// Registers SIGINT and SIGTERM handlers that set [`Shutdown::flag`].
///
/// A second signal after the flag is set terminates the process outright.
///
/// # Errors
///
/// Returns the OS error if a handler cannot be installed.
pub fn register_shutdown() -> std::io::Result<Shutdown> {
    let requested = Arc::new(AtomicBool::new(false));
    let restored = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        flag::register_conditional_default(signal, Arc::clone(&restored))?;
        // Order matters: the conditional shutdown sees the flag from the first signal.
        flag::register_conditional_shutdown(signal, 1, Arc::clone(&requested))?;
        flag::register(signal, Arc::clone(&requested))?;
    }
    Ok(Shutdown { requested, restored })
}

/// Cancels `token` once `term` is set. The task ends when the token is
/// cancelled from either side.
pub fn spawn_cancel_watcher(term: Arc<AtomicBool>, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_millis(50)) => {
                    if term.load(Ordering::Relaxed) {
                        tracing::warn!("interrupt received; cancelling suggestion run");
                        token.cancel();
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watcher_cancels_when_flag_is_set() {
        let term = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();
        let handle = spawn_cancel_watcher(Arc::clone(&term), token.clone());

        term.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn dropping_shutdown_restores_default_handling() {
        let requested = Arc::new(AtomicBool::new(false));
        let restored = Arc::new(AtomicBool::new(false));
        let shutdown = Shutdown { requested: Arc::clone(&requested), restored: Arc::clone(&restored) };
        assert!(Arc::ptr_eq(&shutdown.flag(), &requested));

        drop(shutdown);
        assert!(restored.load(Ordering::Relaxed));
        assert!(!requested.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn watcher_exits_when_token_is_cancelled() {
        let token = CancellationToken::new();
        let handle = spawn_cancel_watcher(Arc::new(AtomicBool::new(false)), token.clone());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
