//! Subscriber fan-out.
//!
//! [`Fanout`] delivers each [`Notification`] to every registered
//! [`DeviceListener`]. Delivery works on a snapshot of the listener list, so
//! listeners may subscribe or unsubscribe from inside a callback without
//! deadlocking. A listener that fails or panics is logged and counted; the
//! rest still receive the notification.
//!
//! Async consumers can use [`Fanout::channel`] instead, which bridges every
//! published notification onto a `tokio::sync::broadcast` channel as a
//! [`NotificationSummary`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use bluesync_types::{AdapterState, BondFailureReason, BondState, ConnectionState, ProfileId};

use crate::events::{Notification, NotificationSummary};
use crate::registry::DeviceHandle;

/// Error type listeners may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by listener callbacks.
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Callbacks for device and adapter changes.
///
/// Every method defaults to doing nothing, so implementors only override
/// what they care about. Callbacks run on the dispatcher task and should
/// return quickly.
pub trait DeviceListener: Send + Sync {
    fn on_adapter_state_changed(&self, _state: AdapterState) -> ListenerResult {
        Ok(())
    }

    fn on_scanning_state_changed(&self, _started: bool) -> ListenerResult {
        Ok(())
    }

    fn on_device_added(&self, _device: &DeviceHandle) -> ListenerResult {
        Ok(())
    }

    fn on_device_deleted(&self, _device: &DeviceHandle) -> ListenerResult {
        Ok(())
    }

    fn on_device_bond_state_changed(
        &self,
        _device: &DeviceHandle,
        _state: BondState,
    ) -> ListenerResult {
        Ok(())
    }

    fn on_device_attributes_changed(&self, _device: &DeviceHandle) -> ListenerResult {
        Ok(())
    }

    fn on_profile_connection_state_changed(
        &self,
        _device: &DeviceHandle,
        _profile: ProfileId,
        _state: ConnectionState,
    ) -> ListenerResult {
        Ok(())
    }

    fn on_service_connected(&self, _profile: ProfileId) -> ListenerResult {
        Ok(())
    }

    fn on_service_disconnected(&self, _profile: ProfileId) -> ListenerResult {
        Ok(())
    }

    fn on_pairing_failed(
        &self,
        _device: &DeviceHandle,
        _reason: BondFailureReason,
    ) -> ListenerResult {
        Ok(())
    }

    /// Route a notification to the matching callback.
    fn on_notification(&self, notification: &Notification) -> ListenerResult {
        match notification {
            Notification::AdapterStateChanged(state) => self.on_adapter_state_changed(*state),
            Notification::ScanningStateChanged(started) => {
                self.on_scanning_state_changed(*started)
            }
            Notification::DeviceAdded(device) => self.on_device_added(device),
            Notification::DeviceDeleted(device) => self.on_device_deleted(device),
            Notification::DeviceBondStateChanged(device, state) => {
                self.on_device_bond_state_changed(device, *state)
            }
            Notification::DeviceAttributesChanged(device) => {
                self.on_device_attributes_changed(device)
            }
            Notification::ProfileConnectionStateChanged {
                device,
                profile,
                state,
            } => self.on_profile_connection_state_changed(device, *profile, *state),
            Notification::ServiceConnected(profile) => self.on_service_connected(*profile),
            Notification::ServiceDisconnected(profile) => self.on_service_disconnected(*profile),
            Notification::PairingFailed { device, reason } => {
                self.on_pairing_failed(device, *reason)
            }
        }
    }
}

/// Listener backed by a closure that sees every notification.
///
/// ```
/// use bluesync_core::fanout::{Fanout, FnListener};
///
/// let fanout = Fanout::new(16);
/// let id = fanout.subscribe(FnListener::new(|n| {
///     println!("{:?}", n.summary());
///     Ok(())
/// }));
/// assert!(fanout.unsubscribe(id));
/// ```
pub struct FnListener<F> {
    callback: F,
}

impl<F> FnListener<F>
where
    F: Fn(&Notification) -> ListenerResult + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> DeviceListener for FnListener<F>
where
    F: Fn(&Notification) -> ListenerResult + Send + Sync,
{
    fn on_notification(&self, notification: &Notification) -> ListenerResult {
        (self.callback)(notification)
    }
}

/// Identifier returned by [`Fanout::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Outcome of one [`Fanout::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    /// Listeners whose callback returned `Ok`.
    pub delivered: usize,
    /// Listeners whose callback returned `Err` or panicked.
    pub failed: usize,
    /// Listeners skipped because the publish re-entered their own callback.
    pub skipped: usize,
}

struct Entry {
    id: SubscriptionId,
    listener: Box<dyn DeviceListener>,
    delivery: Mutex<()>,
}

thread_local! {
    /// Listeners whose callback is running on this thread.
    static DELIVERING: RefCell<HashSet<SubscriptionId>> = RefCell::new(HashSet::new());
}

/// Removes the listener from [`DELIVERING`] even if the callback unwinds.
struct DeliveryMark(SubscriptionId);

impl DeliveryMark {
    fn enter(id: SubscriptionId) -> Option<Self> {
        DELIVERING
            .with(|set| set.borrow_mut().insert(id))
            .then_some(Self(id))
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|set| {
            set.borrow_mut().remove(&self.0);
        });
    }
}

/// Registered listeners plus the broadcast bridge.
pub struct Fanout {
    listeners: Mutex<Vec<Arc<Entry>>>,
    next_id: AtomicU64,
    bridge: broadcast::Sender<NotificationSummary>,
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout")
            .field("listeners", &self.len())
            .field("channel_receivers", &self.bridge.receiver_count())
            .finish()
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Fanout {
    /// Create a fan-out whose broadcast bridge buffers `capacity` summaries.
    pub fn new(capacity: usize) -> Self {
        let (bridge, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            bridge,
        }
    }

    /// Register a listener.
    pub fn subscribe(&self, listener: impl DeviceListener + 'static) -> SubscriptionId {
        self.subscribe_boxed(Box::new(listener))
    }

    /// Register an already boxed listener.
    pub fn subscribe_boxed(&self, listener: Box<dyn DeviceListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(Entry {
            id,
            listener,
            delivery: Mutex::new(()),
        });
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        debug!("Listener {} subscribed", id);
        id
    }

    /// Remove a listener. Returns whether it was registered.
    ///
    /// A publish already in progress still delivers to the listener; the
    /// removal applies from the next publish.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        match listeners.iter().position(|e| e.id == id) {
            Some(index) => {
                listeners.remove(index);
                debug!("Listener {} unsubscribed", id);
                true
            }
            None => false,
        }
    }

    /// Receive every published notification as a [`NotificationSummary`].
    ///
    /// Slow receivers lag and lose the oldest summaries; direct listeners
    /// are unaffected.
    pub fn channel(&self) -> broadcast::Receiver<NotificationSummary> {
        self.bridge.subscribe()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a notification to every listener registered at call time.
    pub fn publish(&self, notification: &Notification) -> PublishReport {
        let snapshot: Vec<Arc<Entry>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        // Lock is released here; callbacks may subscribe or unsubscribe.

        let mut report = PublishReport::default();
        for entry in snapshot {
            let Some(_mark) = DeliveryMark::enter(entry.id) else {
                debug!("Skipping re-entrant delivery to listener {}", entry.id);
                report.skipped += 1;
                continue;
            };

            let _serial = entry
                .delivery
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                entry.listener.on_notification(notification)
            }));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!("Listener {} failed: {}", entry.id, e);
                    report.failed += 1;
                }
                Err(_) => {
                    warn!("Listener {} panicked", entry.id);
                    report.failed += 1;
                }
            }
        }

        if self.bridge.receiver_count() > 0 {
            // Receivers may drop between the check and the send.
            let _ = self.bridge.send(notification.summary());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn counting() -> (Arc<AtomicUsize>, impl DeviceListener + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let listener = FnListener::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (count, listener)
    }

    #[test]
    fn test_publish_reaches_every_listener() {
        let fanout = Fanout::new(8);
        let (a, listener_a) = counting();
        let (b, listener_b) = counting();
        fanout.subscribe(listener_a);
        fanout.subscribe(listener_b);

        let report = fanout.publish(&Notification::ScanningStateChanged(true));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_and_panicking_listeners_are_isolated() {
        let fanout = Fanout::new(8);
        fanout.subscribe(FnListener::new(|_| Err("boom".into())));
        fanout.subscribe(FnListener::new(|_| panic!("listener bug")));
        let (count, listener) = counting();
        fanout.subscribe(listener);

        let report = fanout.publish(&Notification::ServiceConnected(ProfileId::A2dp));
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The panicking listener stays registered and keeps getting called.
        let report = fanout.publish(&Notification::ServiceConnected(ProfileId::A2dp));
        assert_eq!(report.failed, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let fanout = Fanout::new(8);
        let (count, listener) = counting();
        let id = fanout.subscribe(listener);

        assert!(fanout.unsubscribe(id));
        assert!(!fanout.unsubscribe(id));
        assert!(fanout.is_empty());

        fanout.publish(&Notification::ScanningStateChanged(false));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_from_inside_callback_applies_next_publish() {
        let fanout = Arc::new(Fanout::new(8));
        let target = Arc::new(Mutex::new(None::<SubscriptionId>));
        let (count, listener) = counting();

        let remover = {
            let fanout = Arc::clone(&fanout);
            let target = Arc::clone(&target);
            FnListener::new(move |_| {
                if let Some(id) = target.lock().unwrap().take() {
                    fanout.unsubscribe(id);
                }
                Ok(())
            })
        };
        fanout.subscribe(remover);
        let victim = fanout.subscribe(listener);
        *target.lock().unwrap() = Some(victim);

        // The victim was in the snapshot, so this publish still reaches it.
        let report = fanout.publish(&Notification::ScanningStateChanged(true));
        assert_eq!(report.delivered, 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(fanout.len(), 1);

        fanout.publish(&Notification::ScanningStateChanged(false));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_from_inside_callback_does_not_deadlock() {
        let fanout = Arc::new(Fanout::new(8));
        let added = Arc::new(AtomicBool::new(false));
        {
            let fanout_inner = Arc::clone(&fanout);
            let added = Arc::clone(&added);
            fanout.subscribe(FnListener::new(move |_| {
                if !added.swap(true, Ordering::SeqCst) {
                    fanout_inner.subscribe(FnListener::new(|_| Ok(())));
                }
                Ok(())
            }));
        }

        let report = fanout.publish(&Notification::ScanningStateChanged(true));
        // The new listener was not in the snapshot.
        assert_eq!(report.delivered, 1);
        assert_eq!(fanout.len(), 2);
    }

    #[test]
    fn test_reentrant_publish_skips_the_publishing_listener() {
        let fanout = Arc::new(Fanout::new(8));
        let inner = Arc::new(Mutex::new(None::<PublishReport>));
        {
            let fanout_inner = Arc::clone(&fanout);
            let inner = Arc::clone(&inner);
            fanout.subscribe(FnListener::new(move |n| {
                if matches!(n, Notification::ScanningStateChanged(true)) {
                    let report = fanout_inner.publish(&Notification::ScanningStateChanged(false));
                    *inner.lock().unwrap() = Some(report);
                }
                Ok(())
            }));
        }

        let outer = fanout.publish(&Notification::ScanningStateChanged(true));
        assert_eq!(outer.delivered, 1);
        let inner = inner.lock().unwrap().unwrap();
        assert_eq!(inner.skipped, 1);
        assert_eq!(inner.delivered, 0);
    }

    #[test]
    fn test_trait_routing() {
        struct AdapterOnly(Arc<AtomicUsize>);
        impl DeviceListener for AdapterOnly {
            fn on_adapter_state_changed(&self, state: AdapterState) -> ListenerResult {
                assert_eq!(state, AdapterState::Off);
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let fanout = Fanout::new(8);
        let count = Arc::new(AtomicUsize::new(0));
        fanout.subscribe(AdapterOnly(Arc::clone(&count)));

        fanout.publish(&Notification::ScanningStateChanged(true));
        fanout.publish(&Notification::AdapterStateChanged(AdapterState::Off));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_bridge() {
        let fanout = Fanout::new(8);
        let mut rx = fanout.channel();

        fanout.publish(&Notification::ServiceDisconnected(ProfileId::Hid));
        let summary = rx.recv().await.unwrap();
        assert_eq!(
            summary,
            NotificationSummary::ServiceDisconnected {
                profile: ProfileId::Hid
            }
        );
    }
}
