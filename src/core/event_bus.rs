//! In-process event bus with a single asynchronous dispatcher.
//!
//! `fire_event` never blocks: events are queued and delivered in order by a
//! background task. Listeners run on that task, so a slow listener delays
//! every later event.

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};

/// Anything that can travel over the bus.
pub trait Event: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + fmt::Debug> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Receives events of type `E`.
pub trait EventListener<E>: Send + Sync {
    fn on_event(&self, event: &E);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler = Arc<dyn Fn(&dyn Event) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    id: ListenerId,
    handler: Handler,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

struct EventBusInner {
    sender: mpsc::UnboundedSender<Arc<dyn Event>>,
    listeners: Arc<ArcSwap<Vec<Subscription>>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl EventBus {
    /// Start the bus and its dispatcher task. Must be called from within a
    /// Tokio runtime. The dispatcher stops when `shutdown` is cancelled.
    pub fn start(shutdown: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let listeners: Arc<ArcSwap<Vec<Subscription>>> = Arc::new(ArcSwap::from_pointee(Vec::new()));

        tokio::spawn(
            dispatch(receiver, listeners.clone(), shutdown.clone())
                .instrument(info_span!("event_dispatcher")),
        );

        Self {
            inner: Arc::new(EventBusInner {
                sender,
                listeners,
                next_id: AtomicU64::new(1),
                shutdown,
            }),
        }
    }

    /// Queue an event for delivery.
    pub fn fire_event<E: Event>(&self, event: E) {
        if self.inner.sender.send(Arc::new(event)).is_err() {
            debug!("Event bus stopped, dropping event");
        }
    }

    /// Subscribe to events of exactly type `E`.
    pub fn subscribe<E, L>(&self, listener: Arc<L>) -> ListenerId
    where
        E: Event,
        L: EventListener<E> + ?Sized + 'static,
    {
        self.add(Arc::new(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                listener.on_event(event);
            }
        }))
    }

    /// Subscribe a closure to events of type `E`.
    pub fn subscribe_fn<E: Event>(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        self.add(Arc::new(move |event: &dyn Event| {
            if let Some(event) = event.as_any().downcast_ref::<E>() {
                listener(event);
            }
        }))
    }

    /// Subscribe to every event regardless of type.
    pub fn subscribe_all(&self, listener: impl Fn(&dyn Event) + Send + Sync + 'static) -> ListenerId {
        self.add(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let previous = self.inner.listeners.rcu(|current| {
            current
                .iter()
                .filter(|subscription| subscription.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|subscription| subscription.id == id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.load().len()
    }

    pub fn is_running(&self) -> bool {
        !self.inner.shutdown.is_cancelled() && !self.inner.sender.is_closed()
    }

    /// Stop accepting events. Events already queued are still delivered.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn add(&self, handler: Handler) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscription = Subscription { id, handler };
        self.inner.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(subscription.clone());
            next
        });
        id
    }
}

async fn dispatch(
    mut receiver: mpsc::UnboundedReceiver<Arc<dyn Event>>,
    listeners: Arc<ArcSwap<Vec<Subscription>>>,
    shutdown: CancellationToken,
) {
    info!("Starting event dispatcher");
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        deliver(&listeners, &*event);
    }

    // Events fired before shutdown still reach their listeners.
    receiver.close();
    let mut drained = 0usize;
    while let Ok(event) = receiver.try_recv() {
        deliver(&listeners, &*event);
        drained += 1;
    }
    info!("Event dispatcher stopped. drained={}", drained);
}

fn deliver(listeners: &ArcSwap<Vec<Subscription>>, event: &dyn Event) {
    let snapshot = listeners.load_full();
    for subscription in snapshot.iter() {
        let delivered = catch_unwind(AssertUnwindSafe(|| (subscription.handler)(event)));
        if delivered.is_err() {
            error!("Event listener panicked while handling {:?}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Ping(u32);

    #[derive(Debug)]
    struct Pong;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
    }

    impl EventListener<Ping> for Recorder {
        fn on_event(&self, event: &Ping) {
            self.seen.lock().unwrap().push(event.0);
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_delivers_in_order_to_typed_listener() {
        let bus = EventBus::start(CancellationToken::new());
        let recorder = Arc::new(Recorder::default());
        bus.subscribe::<Ping, _>(recorder.clone());

        for i in 0..5 {
            bus.fire_event(Ping(i));
        }
        bus.fire_event(Pong);
        settle().await;

        assert_eq!(*recorder.seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_subscribe_all_sees_every_type() {
        let bus = EventBus::start(CancellationToken::new());
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        bus.subscribe_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.fire_event(Ping(1));
        bus.fire_event(Pong);
        settle().await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_listener_does_not_stop_dispatch() {
        let bus = EventBus::start(CancellationToken::new());
        bus.subscribe_fn(|_: &Ping| panic!("listener failure"));
        let recorder = Arc::new(Recorder::default());
        bus.subscribe::<Ping, _>(recorder.clone());

        bus.fire_event(Ping(7));
        bus.fire_event(Ping(8));
        settle().await;

        assert_eq!(*recorder.seen.lock().unwrap(), vec![7, 8]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::start(CancellationToken::new());
        let recorder = Arc::new(Recorder::default());
        let id = bus.subscribe::<Ping, _>(recorder.clone());
        assert_eq!(bus.listener_count(), 1);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.fire_event(Ping(1));
        settle().await;

        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_stops_delivery() {
        let token = CancellationToken::new();
        let bus = EventBus::start(token.clone());
        let recorder = Arc::new(Recorder::default());
        bus.subscribe::<Ping, _>(recorder.clone());

        bus.shutdown();
        settle().await;
        bus.fire_event(Ping(1));
        settle().await;

        assert!(!bus.is_running());
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_delivers_already_queued_events() {
        let bus = EventBus::start(CancellationToken::new());
        let recorder = Arc::new(Recorder::default());
        bus.subscribe::<Ping, _>(recorder.clone());

        for i in 0..3 {
            bus.fire_event(Ping(i));
        }
        bus.shutdown();
        settle().await;

        assert_eq!(*recorder.seen.lock().unwrap(), vec![0, 1, 2]);
        assert!(!bus.is_running());
    }
}
