use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use scc::HashSet;
use tokio::{sync::Semaphore, task::JoinSet, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{core::stateful::StatefulBeanInstance, tracing_setup::configure_component_tracing};

/// Background loop that keeps retrying binds for beans that are still unbound.
///
/// Each tick fans the attempts out to spawned tasks, at most `pool_size` of
/// them binding at once, so one slow discovery does not hold up the rest.
/// A bean gets no new attempt while an earlier one is still queued or running.
pub struct RebindWorker {
    beans: ArcSwap<Vec<Arc<StatefulBeanInstance>>>,
    /// Ids of beans with an attempt queued or running.
    in_flight: Arc<HashSet<u64>>,
    interval: Duration,
    pool: Arc<Semaphore>,
    pool_size: usize,
    shutdown: CancellationToken,
}

impl RebindWorker {
    pub fn new(interval: Duration, pool_size: usize, shutdown: CancellationToken) -> Self {
        let pool_size = pool_size.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            beans: ArcSwap::from_pointee(Vec::new()),
            in_flight: Arc::new(HashSet::new()),
            interval,
            pool: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            shutdown,
        }
    }

    pub fn add(&self, bean: Arc<StatefulBeanInstance>) {
        self.beans.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(bean.clone());
            next
        });
    }

    pub fn managed_bean_count(&self) -> usize {
        self.beans.load().len()
    }

    /// Beans with a bind attempt queued or running.
    pub fn pending_attempt_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Spawn the worker loop onto the current runtime.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(
            async move { worker.run().await }
                .instrument(configure_component_tracing("rebind_worker")),
        )
    }

    /// Run the worker loop until the shutdown token is cancelled
    pub async fn run(&self) {
        tracing::info!(
            "Starting bean rebind worker with interval: {:?}, pool size: {}",
            self.interval,
            self.pool_size
        );

        let mut attempts = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = sleep(self.interval) => {}
            }

            Self::reap(&mut attempts);
            let spawned = self.spawn_attempts(&mut attempts);
            tracing::debug!("Rebind tick spawned {} bind attempts", spawned);
        }

        // In-flight attempts are left to finish on their own.
        attempts.detach_all();
        tracing::info!(
            "Bean rebind worker stopped, managed beans: {}",
            self.managed_bean_count()
        );
    }

    fn spawn_attempts(&self, attempts: &mut JoinSet<()>) -> usize {
        let mut spawned = 0;
        for bean in self.beans.load().iter() {
            if bean.is_bound() {
                continue;
            }
            if self.in_flight.insert(bean.id()).is_err() {
                tracing::trace!(
                    "Bind attempt still pending. bean={} bean_id={}",
                    bean.bean_key(),
                    bean.id()
                );
                continue;
            }
            let pending = PendingAttempt {
                in_flight: self.in_flight.clone(),
                bean_id: bean.id(),
            };
            let bean = bean.clone();
            let pool = self.pool.clone();
            attempts.spawn(async move {
                let _pending = pending;
                let Ok(_permit) = pool.acquire_owned().await else {
                    return;
                };
                tracing::debug!("Binding bean. bean={} bean_id={}", bean.bean_key(), bean.id());
                bean.try_bind().await;
            });
            spawned += 1;
        }
        spawned
    }

    fn reap(attempts: &mut JoinSet<()>) {
        while let Some(result) = attempts.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    tracing::error!("Bind attempt panicked: {}", e);
                }
            }
        }
    }
}

/// Clears the bean's in-flight mark when its attempt ends, aborted or not.
struct PendingAttempt {
    in_flight: Arc<HashSet<u64>>,
    bean_id: u64,
}

impl Drop for PendingAttempt {
    fn drop(&mut self) {
        self.in_flight.remove(&self.bean_id);
    }
}
