//! Session lifecycle: one store and one push subscription, created at
//! sign-in and torn down at sign-out.

use std::sync::Arc;

use crm_gateway::{CrmApi, CrmClient, EventEnvelope, GatewayError};
use futures::Stream;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::consumer::{spawn_consumer, ConsumerHandle};
use crate::error::SyncError;
use crate::store::{EventEffect, SyncStore};

/// A live inbox session.
#[derive(Debug)]
pub struct InboxSession<A: CrmApi + 'static> {
    store: Arc<SyncStore<A>>,
    consumer: Option<ConsumerHandle>,
}

impl<A: CrmApi + 'static> InboxSession<A> {
    /// Start a session over an already opened event stream.
    pub fn start<S, F>(store: SyncStore<A>, events: S, on_effect: F) -> Self
    where
        S: Stream<Item = Result<EventEnvelope, GatewayError>> + Send + 'static,
        F: FnMut(&EventEffect) + Send + 'static,
    {
        let store = Arc::new(store);
        let consumer = spawn_consumer(Arc::clone(&store), events, on_effect);
        Self {
            store,
            consumer: Some(consumer),
        }
    }

    pub fn store(&self) -> &Arc<SyncStore<A>> {
        &self.store
    }

    /// False once the push subscription has stopped, for any reason.
    pub fn is_live(&self) -> bool {
        self.consumer.as_ref().is_some_and(|c| !c.is_finished())
    }

    /// Stop the consumer, close the subscription and forget all state.
    pub async fn close(mut self) -> Result<(), SyncError> {
        let result = match self.consumer.take() {
            Some(consumer) => consumer.shutdown().await,
            None => Ok(()),
        };
        self.store.reset().await;
        info!("Inbox session closed");
        result
    }
}

/// Sign in against the real backend: open the push subscription and load
/// the roster. Events that arrive during the load are applied after it.
pub async fn connect<F>(
    client: CrmClient,
    config: SyncConfig,
    on_effect: F,
) -> Result<InboxSession<CrmClient>, SyncError>
where
    F: FnMut(&EventEffect) + Send + 'static,
{
    let events = client.subscribe()?;
    let store = SyncStore::new(client, config);

    if let Err(e) = store.refresh_roster(None).await {
        if matches!(e, SyncError::Unauthenticated) {
            return Err(e);
        }
        warn!("Initial roster load failed: {}", e);
    }

    Ok(InboxSession::start(store, events, on_effect))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};
    use mock_gateway::{fixtures, ScriptedApi};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_session_applies_events_and_closes() {
        let api = ScriptedApi::new();
        api.add_customer(fixtures::customer_with("a", "hi", 10, 0));
        let store = SyncStore::new(api, SyncConfig::new("t1"));
        store.refresh_roster(None).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = stream::iter(vec![Ok(fixtures::inbound_event(
            "t1",
            fixtures::inbound(5, "b", "new here", 20),
            1,
        ))])
        .chain(stream::pending());

        let session = InboxSession::start(store, events, move |effect| {
            let _ = tx.send(effect.clone());
        });

        let effect = rx.recv().await.unwrap();
        assert!(matches!(effect, EventEffect::InboundMessage { .. }));
        assert!(session.is_live());

        let store = Arc::clone(session.store());
        assert_eq!(store.snapshot().await.roster[0].id, "b");

        session.close().await.unwrap();
        assert!(store.snapshot().await.roster.is_empty());
    }
}
