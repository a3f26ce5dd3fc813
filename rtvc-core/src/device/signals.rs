use parking_lot::{Condvar, Mutex};

use crate::traits::device::{ShutdownTrigger, Wake};

#[derive(Debug, Default)]
struct SignalState {
    pending: u64,
    shutdown: bool,
}

/// Samples-ready / shutdown pair for sessions without native event handles.
///
/// Ready notifications are counted, so every notification produces one
/// wake-up. Shutdown wins over pending notifications and stays set until
/// `reset`.
#[derive(Debug, Default)]
pub struct SignalPair {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl SignalPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_ready(&self) {
        self.state.lock().pending += 1;
        self.cond.notify_one();
    }

    pub fn request_shutdown(&self) {
        self.state.lock().shutdown = true;
        self.cond.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    pub fn pending(&self) -> u64 {
        self.state.lock().pending
    }

    /// Block until a ready notification or shutdown.
    pub fn wait(&self) -> Wake {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return Wake::Shutdown;
            }
            if state.pending > 0 {
                state.pending -= 1;
                return Wake::SamplesReady;
            }
            self.cond.wait(&mut state);
        }
    }

    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.pending = 0;
        state.shutdown = false;
    }
}

impl ShutdownTrigger for SignalPair {
    fn trigger(&self) {
        self.request_shutdown();
    }
}
