//! Component runtime — runs one independent task per bot identity.
//!
//! # Component model
//!
//! A [`Component`] is an independently-runnable unit: in practice one
//! platform connection driving one bot worker. Components are built with
//! their shared state already captured inside them, then handed to
//! [`spawn_components`].
//!
//! # Failure isolation
//!
//! Bots do not share fate. A component that returns an error or panics is
//! logged and forgotten; its siblings keep running. Only the shared
//! [`CancellationToken`] (cancelled by the supervisor on shutdown) stops
//! everything.

use std::future::Future;
use std::pin::Pin;

use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;

/// A boxed, owned future returned by [`Component::run`].
pub type ComponentFuture = Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'static>>;

/// A self-contained, concurrently-runnable unit.
///
/// [`Component::run`] is called once by [`spawn_components`] and should run
/// until `shutdown` is cancelled or the component's own work is done.
pub trait Component: Send + 'static {
    /// Stable identifier used in log messages.
    fn id(&self) -> &str;

    /// Consume the component and return its run-loop as a boxed future.
    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture;
}

/// Handle to a running component set.
pub struct ComponentsHandle {
    inner: JoinHandle<RunSummary>,
}

/// How the components of a set ended.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub clean: usize,
    /// Ids of components that returned an error or panicked.
    pub failed: Vec<String>,
}

impl ComponentsHandle {
    /// Wait for every component to exit.
    pub async fn join(self) -> Result<RunSummary, AppError> {
        self.inner
            .await
            .map_err(|e| AppError::Platform(format!("component manager panicked: {e}")))
    }
}

/// Spawn each [`Component`] as its own Tokio task.
///
/// A component failure is logged with its id and does not touch `shutdown`.
pub fn spawn_components(components: Vec<Box<dyn Component>>, shutdown: CancellationToken) -> ComponentsHandle {
    let handle = tokio::spawn(async move {
        let mut set: JoinSet<(String, Result<Result<(), AppError>, JoinError>)> = JoinSet::new();

        for component in components {
            let id = component.id().to_string();
            debug!(component = %id, "spawning component");
            // Nested task so a panic is reported against the component's id.
            let task = tokio::spawn(component.run(shutdown.clone()));
            set.spawn(async move { (id, task.await) });
        }

        let mut summary = RunSummary::default();
        while let Some(res) = set.join_next().await {
            match res {
                Ok((id, Ok(Ok(())))) => {
                    info!(component = %id, "component exited");
                    summary.clean += 1;
                }
                Ok((id, Ok(Err(e)))) => {
                    error!(component = %id, error = %e, "component failed");
                    summary.failed.push(id);
                }
                Ok((id, Err(e))) => {
                    error!(component = %id, error = %e, "component panicked");
                    summary.failed.push(id);
                }
                Err(e) => error!(error = %e, "component wrapper failed"),
            }
        }
        summary
    });

    ComponentsHandle { inner: handle }
}
