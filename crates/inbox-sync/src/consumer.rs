//! Event stream consumer: drains one push subscription into a store.
//!
//! There is exactly one subscription per session. It is not re-opened per
//! conversation switch; events are filtered by tenant and routed by the
//! store. A malformed payload is logged and skipped. A transport error
//! closes the subscription and ends the consumer; retrying is left to
//! whoever owns the session.

use std::future::Future;
use std::sync::Arc;

use crm_gateway::{CrmApi, EventEnvelope, GatewayError};
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;
use crate::store::{EventEffect, SyncStore};

/// Apply every event from `events` to `store` until `shutdown` completes
/// or the stream stops.
///
/// `on_effect` observes each applied event, for example to drive scrolling.
/// Returns `Ok(())` on shutdown, the transport error if the stream failed,
/// or [`SyncError::StreamEnded`] if it simply ended.
pub async fn run_consumer<A, S, F, Sh>(
    store: Arc<SyncStore<A>>,
    events: S,
    shutdown: Sh,
    mut on_effect: F,
) -> Result<(), SyncError>
where
    A: CrmApi,
    S: Stream<Item = Result<EventEnvelope, GatewayError>>,
    F: FnMut(&EventEffect),
    Sh: Future<Output = ()>,
{
    info!(
        "Starting event consumer for tenant {}",
        store.config().tenant_id
    );

    tokio::pin!(events);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!("Shutdown requested, stopping event consumer");
                return Ok(());
            }

            next = events.next() => {
                match next {
                    Some(Ok(envelope)) => {
                        let kind = envelope.event.kind();
                        let effect = store.apply_event(envelope).await;
                        debug!("Applied {} event: {:?}", kind, effect);
                        on_effect(&effect);
                    }
                    Some(Err(e)) if e.is_malformed() => {
                        warn!("Skipping malformed event: {}", e);
                    }
                    Some(Err(e)) => {
                        error!("Event stream failed: {}", e);
                        return Err(e.into());
                    }
                    None => {
                        warn!("Event stream ended");
                        return Err(SyncError::StreamEnded);
                    }
                }
            }
        }
    }
}

/// Handle to a consumer running on its own task.
///
/// Dropping the handle aborts the task, which drops the subscription.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), SyncError>>>,
}

impl ConsumerHandle {
    /// Stop the consumer and wait for it to release the subscription.
    ///
    /// Returns how the consumer ended; a consumer that already stopped on
    /// its own reports that result instead.
    pub async fn shutdown(mut self) -> Result<(), SyncError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Event consumer task failed: {}", e);
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Spawn [`run_consumer`] on the current runtime.
pub fn spawn_consumer<A, S, F>(store: Arc<SyncStore<A>>, events: S, on_effect: F) -> ConsumerHandle
where
    A: CrmApi + 'static,
    S: Stream<Item = Result<EventEnvelope, GatewayError>> + Send + 'static,
    F: FnMut(&EventEffect) + Send + 'static,
{
    let (tx, rx) = oneshot::channel::<()>();
    let shutdown = async move {
        // A dropped sender also stops the consumer.
        let _ = rx.await;
    };

    let task = tokio::spawn(run_consumer(store, events, shutdown, on_effect));

    ConsumerHandle {
        shutdown: Some(tx),
        task: Some(task),
    }
}
