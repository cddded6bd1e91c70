//! Tunnel recursion detection
//!
//! If the host routes the overlay's own transport over a virtual network
//! (deliberately or through a routing mistake), our emitted datagrams come
//! straight back in through the tap. The detector remembers the tails of
//! recently sent wire packets; a tap frame whose tail matches one is our
//! own traffic re-entering and must not be forwarded.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Number of recent wire packets remembered
const HISTORY_LEN: usize = 16;

/// Bytes of tail remembered per packet
const TAIL_LEN: usize = 32;

/// Shorter frames than this never count as a match
const MIN_MATCH_LEN: usize = 16;

/// Recent-outbound-packet memory
pub struct AntiRecursion {
    history: Mutex<VecDeque<Vec<u8>>>,
}

fn tail(data: &[u8]) -> &[u8] {
    &data[data.len().saturating_sub(TAIL_LEN)..]
}

impl AntiRecursion {
    pub(crate) fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::with_capacity(HISTORY_LEN)),
        }
    }

    /// Remember an outbound wire packet
    pub(crate) fn log_outgoing(&self, packet: &[u8]) {
        if packet.len() < MIN_MATCH_LEN {
            return;
        }
        let mut history = lock(&self.history);
        if history.len() == HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(tail(packet).to_vec());
    }

    /// True if a tap frame is safe to forward, false if it is one of our
    /// own recently emitted packets looping back
    pub(crate) fn check_ethernet_frame(&self, frame: &[u8]) -> bool {
        if frame.len() < MIN_MATCH_LEN {
            return true;
        }
        let frame_tail = tail(frame);
        let history = lock(&self.history);
        for logged in history.iter() {
            let n = logged.len().min(frame_tail.len());
            if logged[logged.len() - n..] == frame_tail[frame_tail.len() - n..] {
                return false;
            }
        }
        true
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
