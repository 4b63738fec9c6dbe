//! Wake-up signal for a worker that otherwise sleeps on a timer.
//!
//! A permit is stored when nobody is waiting, so a wake-up raised while the
//! worker is busy is not lost: the next call to [`Notify::notified`] returns
//! immediately. Multiple wake-ups collapse into one permit.

use std::future::Future;

/// Single-permit wake-up primitive.
#[cfg(feature = "tokio")]
#[derive(Debug)]
pub struct Notify(tokio::sync::Notify);

#[cfg(feature = "tokio")]
impl Notify {
    pub fn new() -> Self {
        Self(tokio::sync::Notify::new())
    }

    /// Wakes the waiting task, or stores a permit for the next wait.
    pub fn notify_one(&self) {
        self.0.notify_one();
    }

    /// Completes once [`notify_one`](Notify::notify_one) has been called.
    pub fn notified(&self) -> impl Future<Output = ()> + '_ {
        self.0.notified()
    }
}

#[cfg(feature = "tokio")]
impl Default for Notify {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permit_is_stored() {
        let notify = Notify::new();
        notify.notify_one();
        notify.notify_one();

        // The stored permit satisfies the first wait straight away
        tokio::time::timeout(Duration::from_millis(100), notify.notified())
            .await
            .expect("stored permit was lost");

        // Both wake-ups collapsed into a single permit
        assert!(
            tokio::time::timeout(Duration::from_millis(20), notify.notified())
                .await
                .is_err()
        );
    }
}
