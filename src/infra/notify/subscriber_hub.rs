// In-process fan-out of shop events.
//
// Each shop has a list of subscriber channels. Publishing never blocks: a
// closed receiver is pruned on the next publish to that shop.

use crate::core::shop::{EventNotifier, ShopEvent};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
pub struct SubscriberHub {
    subscribers: DashMap<i64, Vec<mpsc::UnboundedSender<ShopEvent>>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event published for `shop_id` from now on.
    pub fn subscribe(&self, shop_id: i64) -> mpsc::UnboundedReceiver<ShopEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(shop_id).or_default().push(tx);
        rx
    }

    pub fn subscriber_count(&self, shop_id: i64) -> usize {
        self.subscribers
            .get(&shop_id)
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

impl EventNotifier for SubscriberHub {
    fn publish(&self, event: ShopEvent) {
        let shop_id = event.shop_id();
        let Some(mut subs) = self.subscribers.get_mut(&shop_id) else {
            return;
        };
        subs.retain(|sub| sub.send(event.clone()).is_ok());
        let empty = subs.is_empty();
        drop(subs);

        if empty {
            self.subscribers.remove_if(&shop_id, |_, subs| subs.is_empty());
        }
        if matches!(event, ShopEvent::ShopDeleted { .. }) {
            // Nothing more will be published for a deleted shop.
            self.subscribers.remove(&shop_id);
            debug!(shop_id, "Dropped subscribers of deleted shop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_only_subscribers_of_that_shop() {
        let hub = SubscriberHub::new();
        let mut first = hub.subscribe(1);
        let mut second = hub.subscribe(1);
        let mut other = hub.subscribe(2);

        hub.publish(ShopEvent::BalancesChanged { shop_id: 1 });

        assert_eq!(first.recv().await, Some(ShopEvent::BalancesChanged { shop_id: 1 }));
        assert_eq!(second.recv().await, Some(ShopEvent::BalancesChanged { shop_id: 1 }));
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_receivers_are_pruned() {
        let hub = SubscriberHub::new();
        let kept = hub.subscribe(7);
        drop(hub.subscribe(7));
        assert_eq!(hub.subscriber_count(7), 1);

        hub.publish(ShopEvent::CurrenciesChanged { shop_id: 7 });
        assert_eq!(hub.subscribers.get(&7).map(|s| s.len()), Some(1));

        drop(kept);
        hub.publish(ShopEvent::CurrenciesChanged { shop_id: 7 });
        assert!(hub.subscribers.get(&7).is_none());
    }

    #[tokio::test]
    async fn shop_deletion_closes_streams() {
        let hub = SubscriberHub::new();
        let mut rx = hub.subscribe(3);

        hub.publish(ShopEvent::ShopDeleted { shop_id: 3 });

        assert_eq!(rx.recv().await, Some(ShopEvent::ShopDeleted { shop_id: 3 }));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn publishing_without_subscribers_is_a_no_op() {
        let hub = SubscriberHub::new();
        hub.publish(ShopEvent::ShopUpdated { shop_id: 9 });
        assert_eq!(hub.subscriber_count(9), 0);
    }
}
