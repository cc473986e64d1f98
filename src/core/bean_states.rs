use std::{sync::Arc, time::Duration};

use scc::HashMap;
use tokio::sync::watch;
use tracing::debug;

use crate::core::{bean::BeanKey, event_bus::EventListener, stateful::BeanStateChanged};

/// Coarse bind state tracked per bean key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    Bound,
}

/// Latest known bind state of every stateful bean, fed by state change events.
///
/// Waiters block on a `watch` channel per key. `watch::Receiver::wait_for`
/// checks the current value before parking, so a transition that happens
/// between subscribing and waiting is never missed.
#[derive(Default)]
pub struct BeanStateTable {
    states: HashMap<BeanKey, Arc<watch::Sender<BindState>>>,
}

impl BeanStateTable {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    fn monitor(&self, key: &BeanKey) -> Arc<watch::Sender<BindState>> {
        if let Some(sender) = self.states.read(key, |_, sender| sender.clone()) {
            return sender;
        }
        self.states
            .entry(key.clone())
            .or_insert_with(|| Arc::new(watch::channel(BindState::Unbound).0))
            .get()
            .clone()
    }

    pub fn set(&self, key: &BeanKey, state: BindState) {
        let previous = self.monitor(key).send_replace(state);
        if previous != state {
            debug!("Bean {} is now {:?}", key, state);
        }
    }

    pub fn get(&self, key: &BeanKey) -> BindState {
        self.states
            .read(key, |_, sender| *sender.borrow())
            .unwrap_or(BindState::Unbound)
    }

    /// Wait until `key` reaches `target`. Returns `false` on timeout.
    pub async fn wait_for_value(&self, key: &BeanKey, target: BindState, timeout: Duration) -> bool {
        let mut receiver = self.monitor(key).subscribe();
        let reached = tokio::time::timeout(timeout, receiver.wait_for(|state| *state == target)).await;
        matches!(reached, Ok(Ok(_)))
    }
}

impl EventListener<BeanStateChanged> for BeanStateTable {
    fn on_event(&self, event: &BeanStateChanged) {
        let state = if event.current.is_bound() {
            BindState::Bound
        } else {
            BindState::Unbound
        };
        self.set(&event.bean_key, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_key_is_unbound() {
        let table = BeanStateTable::new();
        assert_eq!(table.get(&BeanKey::of::<String>()), BindState::Unbound);
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_already_reached() {
        let table = BeanStateTable::new();
        let key = BeanKey::of::<String>();
        table.set(&key, BindState::Bound);

        assert!(
            table
                .wait_for_value(&key, BindState::Bound, Duration::from_millis(1))
                .await
        );
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let table = BeanStateTable::new();
        let key = BeanKey::of::<String>();

        assert!(
            !table
                .wait_for_value(&key, BindState::Bound, Duration::from_millis(20))
                .await
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_wait_wakes_on_transition() {
        let table = Arc::new(BeanStateTable::new());
        let key = BeanKey::qualified::<String>("late");

        let setter = table.clone();
        let setter_key = key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            setter.set(&setter_key, BindState::Bound);
        });

        assert!(
            table
                .wait_for_value(&key, BindState::Bound, Duration::from_secs(2))
                .await
        );
        assert_eq!(table.get(&key), BindState::Bound);
    }
}
