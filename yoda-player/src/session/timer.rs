//! Resettable one-shot timers
//!
//! A [`TimerSlot`] posts one event into the controller's queue when its delay
//! elapses. Every arm or cancel bumps the slot's generation, so an expiry that
//! was already queued when the slot was reset is recognized as stale.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Forces a stop when no renewing scan arrived in time
    Inactivity,
    /// Lifts the post-stop start restriction
    Cooldown,
}

#[derive(Debug)]
pub struct TimerSlot {
    kind: TimerKind,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            generation: 0,
            task: None,
        }
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// (Re)arm the slot, replacing any pending expiry
    ///
    /// `make_event` receives the new generation. The timer task holds only a
    /// weak sender, so a pending timer never keeps the queue alive.
    pub fn arm<E, F>(
        &mut self,
        delay: Duration,
        tx: &mpsc::WeakUnboundedSender<E>,
        make_event: F,
    ) -> u64
    where
        E: Send + 'static,
        F: FnOnce(TimerKind, u64) -> E + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let kind = self.kind;
        let tx = tx.clone();

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(make_event(kind, generation));
            }
        }));
        generation
    }

    /// Disarm the slot; a queued expiry from before this call becomes stale
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Accept an expiry for `generation`
    ///
    /// Returns false for stale expiries. An accepted expiry disarms the slot.
    pub fn accept(&mut self, generation: u64) -> bool {
        if self.task.is_none() || generation != self.generation {
            return false;
        }
        self.task = None;
        true
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Fired(TimerKind, u64);

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Inactivity);

        let generation = slot.arm(Duration::from_secs(1), &tx.downgrade(), Fired);
        assert!(slot.is_armed());

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let fired = rx.try_recv().unwrap();
        assert_eq!(fired, Fired(TimerKind::Inactivity, generation));
        assert!(slot.accept(fired.1));
        assert!(!slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();
        let mut slot = TimerSlot::new(TimerKind::Cooldown);

        let first = slot.arm(Duration::from_secs(1), &weak, Fired);
        tokio::time::sleep(Duration::from_millis(500)).await;
        let second = slot.arm(Duration::from_secs(1), &weak, Fired);
        assert_ne!(first, second);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(rx.try_recv().is_err(), "first timer must not fire");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(rx.try_recv().unwrap(), Fired(TimerKind::Cooldown, second));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let weak = tx.downgrade();
        let mut slot = TimerSlot::new(TimerKind::Inactivity);

        let stale = slot.arm(Duration::from_millis(10), &weak, Fired);
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Expiry is queued, then the slot is re-armed before it is handled
        assert!(rx.try_recv().is_ok());
        slot.arm(Duration::from_secs(1), &weak, Fired);

        assert!(!slot.accept(stale));
        assert!(slot.is_armed());
    }

    #[test]
    fn test_accept_on_cancelled_slot_is_false() {
        let mut slot = TimerSlot::new(TimerKind::Inactivity);
        slot.cancel();
        assert!(!slot.accept(0));
        assert!(!slot.accept(1));
        assert_eq!(slot.kind(), TimerKind::Inactivity);
    }
}
