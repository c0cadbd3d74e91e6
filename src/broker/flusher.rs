//! Background flushing for shared brokers
//!
//! A batched strategy only drains a topic once its queue reaches the batch
//! size. `run_flush_loop` periodically flushes every topic so a partial
//! batch is delivered within one period, then prunes settled messages so
//! the message table only holds work still in flight. The loop never
//! returns; spawn it and abort the task handle to stop it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::broker::engine::Broker;

pub type SharedBroker = Arc<Mutex<Broker>>;

pub fn shared(broker: Broker) -> SharedBroker {
    Arc::new(Mutex::new(broker))
}

/// Lock a shared broker. A panic inside a handler or listener poisons the
/// mutex; the broker state is still usable afterwards, so the poison is
/// ignored.
pub fn lock(broker: &SharedBroker) -> MutexGuard<'_, Broker> {
    broker.lock().unwrap_or_else(PoisonError::into_inner)
}

pub async fn run_flush_loop(broker: SharedBroker, period: Duration) {
    let mut ticker = time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        tracing::trace!("periodic flush");
        let mut guard = lock(&broker);
        guard.flush_all();
        guard.prune_settled();
    }
}
