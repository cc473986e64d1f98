use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use futures_util::FutureExt;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{core::stateful::StatefulBeanInstance, tracing_setup::configure_component_tracing};

/// Periodically re-runs discovery for every stateful bean so bound beans
/// follow a service that moved or went away.
///
/// The renewal loop is started lazily by the first managed bean.
pub struct LeaseManager {
    leased: ArcSwap<Vec<Arc<StatefulBeanInstance>>>,
    interval: Duration,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl LeaseManager {
    pub fn new(interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            leased: ArcSwap::from_pointee(Vec::new()),
            interval,
            started: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Start renewing leases for `bean`.
    pub fn start_manage_lease(self: &Arc<Self>, bean: Arc<StatefulBeanInstance>) {
        self.leased.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(bean.clone());
            next
        });

        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let manager = self.clone();
            tokio::spawn(
                async move { manager.run().await }
                    .instrument(configure_component_tracing("lease_manager")),
            );
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn leased_bean_count(&self) -> usize {
        self.leased.load().len()
    }

    async fn run(&self) {
        tracing::info!(
            "Starting service lease renewal with interval: {:?}",
            self.interval
        );
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.interval) => {}
            }
            self.renew_all().await;
        }
        tracing::info!("Service lease renewal stopped");
    }

    /// Renew every managed lease once, one bean at a time.
    pub async fn renew_all(&self) {
        let leased = self.leased.load_full();
        tracing::debug!("Renewing {} service leases", leased.len());
        for bean in leased.iter() {
            if AssertUnwindSafe(bean.renew_lease())
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::error!(
                    "Lease renewal panicked. bean={} bean_id={}",
                    bean.bean_key(),
                    bean.id()
                );
            }
        }
    }

    /// Stop renewing and release every managed bean.
    pub async fn destroy(&self) {
        self.shutdown.cancel();
        let leased = self.leased.swap(Arc::new(Vec::new()));
        for bean in leased.iter() {
            bean.destroy().await;
        }
        tracing::info!("Destroyed {} leased service beans", leased.len());
    }
}
