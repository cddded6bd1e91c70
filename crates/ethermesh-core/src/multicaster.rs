//! Multicast group subscriptions
//!
//! Tracks which (network, group) pairs this node has announced interest
//! in. Subscriptions are leases: they must be renewed by resubscription or
//! housekeeping expires them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::mac::Mac;

/// A multicast group: a group MAC plus an additional distinguishing
/// information word (e.g. the IP for broadcast-scoped ARP)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MulticastGroup {
    pub mac: Mac,
    pub adi: u32,
}

/// The multicast subscription table
pub struct Multicaster {
    subscriptions: Mutex<HashMap<(u64, MulticastGroup), u64>>,
}

impl Multicaster {
    pub(crate) fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn subscribe(&self, nwid: u64, group: MulticastGroup, now: u64) {
        lock(&self.subscriptions).insert((nwid, group), now);
    }

    pub(crate) fn unsubscribe(&self, nwid: u64, group: MulticastGroup) {
        lock(&self.subscriptions).remove(&(nwid, group));
    }

    /// Groups currently subscribed on `nwid`, in stable order
    pub fn subscriptions(&self, nwid: u64) -> Vec<MulticastGroup> {
        let mut groups: Vec<MulticastGroup> = lock(&self.subscriptions)
            .keys()
            .filter(|(n, _)| *n == nwid)
            .map(|(_, g)| *g)
            .collect();
        groups.sort();
        groups
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    /// Expire subscriptions that have not been renewed
    pub(crate) fn clean(&self, now: u64, expiration: u64) {
        let mut subs = lock(&self.subscriptions);
        let before = subs.len();
        subs.retain(|_, subscribed_at| now.saturating_sub(*subscribed_at) < expiration);
        if subs.len() != before {
            debug!(dropped = before - subs.len(), "expired multicast subscriptions");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(n: u64) -> MulticastGroup {
        MulticastGroup {
            mac: Mac::from_u64(0x01005e000000 | n),
            adi: 0,
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let mc = Multicaster::new();
        mc.subscribe(7, group(1), 1_000);
        mc.subscribe(7, group(2), 1_000);
        mc.subscribe(9, group(1), 1_000);

        assert_eq!(mc.subscriptions(7).len(), 2);
        assert_eq!(mc.subscriptions(9), vec![group(1)]);

        mc.unsubscribe(7, group(1));
        assert_eq!(mc.subscriptions(7), vec![group(2)]);
    }

    #[test]
    fn test_resubscription_renews() {
        let mc = Multicaster::new();
        mc.subscribe(7, group(1), 1_000);
        mc.subscribe(7, group(1), 500_000);

        mc.clean(600_500, 600_000);
        assert_eq!(mc.subscriptions(7), vec![group(1)]);
    }

    #[test]
    fn test_clean_expires_stale_groups() {
        let mc = Multicaster::new();
        mc.subscribe(7, group(1), 1_000);
        mc.subscribe(7, group(2), 300_000);

        mc.clean(650_000, 600_000);
        assert_eq!(mc.subscriptions(7), vec![group(2)]);
    }
}
