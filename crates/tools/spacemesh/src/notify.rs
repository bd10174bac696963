//! Resource availability notifications

use tokio::sync::broadcast;

/// Signal that the set of available output resources changed
///
/// Fire-and-forget: implementations must not block and cannot fail the run.
pub trait ResourceNotifier: Send + Sync {
    fn resource_list_changed(&self);
}

/// Notifier that drops every signal
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ResourceNotifier for NoopNotifier {
    fn resource_list_changed(&self) {}
}

/// Fans signals out to any number of subscribers
///
/// Signals sent while nobody is subscribed are discarded; lagging
/// subscribers lose the oldest signals.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<()>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ResourceNotifier for BroadcastNotifier {
    fn resource_list_changed(&self) {
        if self.tx.send(()).is_err() {
            tracing::trace!("resource list changed, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::default();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();

        notifier.resource_list_changed();
        notifier.resource_list_changed();

        for rx in [&mut a, &mut b] {
            assert!(rx.recv().await.is_ok());
            assert!(rx.recv().await.is_ok());
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(0);
        notifier.resource_list_changed();
        NoopNotifier.resource_list_changed();
    }
}
