//! Task Supervisor
//!
//! Runs a background loop as a child task and restarts it after a cooldown
//! whenever it panics. Cancellation of the supervisor cancels the child.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error};

/// Callback told about every fault caught by a supervisor.
pub type FaultHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Runs `make()` until it returns normally or is cancelled, restarting it
/// after `cooldown` each time it panics.
pub async fn supervise<F, Fut>(
    name: &'static str,
    cooldown: Duration,
    on_fault: Option<FaultHandler>,
    mut make: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        // Dropping the set aborts the child, so aborting us aborts it too
        let mut child = JoinSet::new();
        child.spawn(make());

        match child.join_next().await {
            Some(Err(err)) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                error!(
                    "{} task panicked: {}; restarting in {} seconds",
                    name,
                    message,
                    cooldown.as_secs()
                );
                if let Some(handler) = &on_fault {
                    handler(&message);
                }
                tokio::time::sleep(cooldown).await;
            }
            Some(Err(err)) => {
                debug!("{} task cancelled: {}", name, err);
                return;
            }
            Some(Ok(())) | None => {
                debug!("{} task finished", name);
                return;
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
