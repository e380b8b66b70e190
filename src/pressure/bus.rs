use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::pressure::sampler::{compute_pressure, SystemMemoryInfo};
use crate::pressure::types::{
    MemoryPressureLevel, PressureCallback, PressureConfig, PressureObserver, SubscriptionId,
    CLEANUP_THRESHOLD, NOTIFY_THRESHOLD,
};

enum Subscriber {
    Observer(Arc<dyn PressureObserver>),
    Callback(PressureCallback),
}

impl Clone for Subscriber {
    fn clone(&self) -> Self {
        match self {
            Subscriber::Observer(o) => Subscriber::Observer(Arc::clone(o)),
            Subscriber::Callback(c) => Subscriber::Callback(Arc::clone(c)),
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    subscriber: Subscriber,
}

/// Process-wide memory pressure signal (§4.4). Constructed once and
/// injected into the Cache Manager and Task Engine at construction
/// (§9 "Singletons") rather than looked up globally, so tests can
/// substitute a controllable fake.
pub struct PressureBus {
    config: PressureConfig,
    current_bits: AtomicU64,
    subscribers: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: Arc<Notify>,
    external_bytes: AtomicU64,
}

impl PressureBus {
    pub fn new(config: PressureConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            current_bits: AtomicU64::new(0f64.to_bits()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            monitor_handle: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            external_bytes: AtomicU64::new(0),
        })
    }

    pub fn current_pressure(&self) -> f64 {
        f64::from_bits(self.current_bits.load(Ordering::Relaxed))
    }

    pub fn level(&self) -> MemoryPressureLevel {
        MemoryPressureLevel::from_pressure(self.current_pressure())
    }

    fn set_current(&self, p: f64) {
        self.current_bits.store(p.to_bits(), Ordering::Relaxed);
    }

    /// Lets a caller that holds its own cache/queue memory (e.g. the Task
    /// Engine) contribute to the sampled total without the bus needing to
    /// know about it structurally.
    pub fn report_external_bytes(&self, bytes: u64) {
        self.external_bytes.store(bytes, Ordering::Relaxed);
    }

    pub fn subscribe(&self, observer: Arc<dyn PressureObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscription {
            id,
            subscriber: Subscriber::Observer(observer),
        });
        id
    }

    pub fn subscribe_fn(&self, callback: PressureCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push(Subscription {
            id,
            subscriber: Subscriber::Callback(callback),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|s| s.id != id);
    }

    /// Samples system memory, updates the current pressure, and — if it
    /// crosses the notify threshold — fans the new value out to every
    /// subscriber serially. A panicking observer is caught and logged; it
    /// never prevents its siblings from being notified (§8 property 15).
    pub async fn check_pressure(&self) -> f64 {
        let info = SystemMemoryInfo::collect();
        let external = self.external_bytes.load(Ordering::Relaxed);
        let p = compute_pressure(&self.config, &info, external);
        self.set_current(p);
        if p > NOTIFY_THRESHOLD {
            self.notify_subscribers(p).await;
        }
        if p > CLEANUP_THRESHOLD {
            self.request_cleanup();
        }
        p
    }

    /// Directly notifies subscribers of `p` without sampling. Used by tests
    /// and by callers that already know the pressure value.
    pub async fn notify(&self, p: f64) {
        self.set_current(p);
        self.notify_subscribers(p).await;
    }

    async fn notify_subscribers(&self, p: f64) {
        let snapshot: Vec<(SubscriptionId, Subscriber)> = {
            let subs = self.subscribers.lock();
            subs.iter().map(|s| (s.id, s.subscriber.clone())).collect()
        };
        for (id, subscriber) in snapshot {
            let result = match subscriber {
                Subscriber::Observer(obs) => {
                    AssertUnwindSafe(obs.on_pressure_change(p)).catch_unwind().await
                }
                Subscriber::Callback(cb) => AssertUnwindSafe(cb(p)).catch_unwind().await,
            };
            match result {
                Ok(()) => debug!(subscriber_id = id.0, pressure = p, "notified pressure subscriber"),
                Err(_) => warn!(subscriber_id = id.0, "pressure observer panicked; notifying remaining subscribers"),
            }
        }
    }

    fn request_cleanup(&self) {
        // No portable forced-GC hook in Rust; this is a logging hint for
        // upstream admission control (§4.4 "no-op where unavailable").
        warn!(pressure = self.current_pressure(), "memory pressure above cleanup threshold");
    }

    pub fn start_monitoring(self: &Arc<Self>) {
        let mut handle_slot = self.monitor_handle.lock();
        if handle_slot.is_some() {
            return;
        }
        let bus = Arc::clone(self);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = Duration::from_secs(self.config.sample_interval_seconds.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        bus.check_pressure().await;
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
        *handle_slot = Some(handle);
        info!("memory pressure monitor started");
    }

    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.monitor_handle.lock().take() {
            self.shutdown.notify_one();
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn simulate_pressure(&self, p: f64) {
        self.set_current(p.clamp(0.0, 1.0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct RecordingObserver {
        calls: Arc<Mutex<Vec<f64>>>,
    }

    #[async_trait::async_trait]
    impl PressureObserver for RecordingObserver {
        async fn on_pressure_change(&self, pressure: f64) {
            self.calls.lock().push(pressure);
        }
    }

    struct PanickingObserver;

    #[async_trait::async_trait]
    impl PressureObserver for PanickingObserver {
        async fn on_pressure_change(&self, _pressure: f64) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn subscribers_are_notified_on_notify() {
        let bus = PressureBus::new(PressureConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(RecordingObserver { calls: calls.clone() }));
        bus.notify(0.95).await;
        assert_eq!(*calls.lock(), vec![0.95]);
    }

    #[tokio::test]
    async fn unsubscribed_observer_is_never_notified() {
        let bus = PressureBus::new(PressureConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe(Arc::new(RecordingObserver { calls: calls.clone() }));
        bus.unsubscribe(id);
        bus.notify(0.95).await;
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn panicking_observer_does_not_block_siblings() {
        let bus = PressureBus::new(PressureConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(PanickingObserver));
        bus.subscribe(Arc::new(RecordingObserver { calls: calls.clone() }));
        bus.notify(0.9).await;
        assert_eq!(*calls.lock(), vec![0.9]);
    }

    #[tokio::test]
    async fn closure_subscribers_are_invoked() {
        let bus = PressureBus::new(PressureConfig::default());
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        bus.subscribe_fn(Arc::new(move |_p: f64| {
            let counted = counted.clone();
            Box::pin(async move {
                counted.fetch_add(1, Ordering::SeqCst);
            })
        }));
        bus.notify(0.9).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn level_reflects_simulated_pressure() {
        let bus = PressureBus::new(PressureConfig::default());
        bus.simulate_pressure(0.96);
        assert_eq!(bus.level(), MemoryPressureLevel::Emergency);
    }
}
