mod calibration;
mod controller;
mod state;

pub use calibration::*;
pub use controller::*;
pub use state::*;

/// Best-effort push of state changes to peers on the network.
pub trait PeerNotifier {
    fn notify(&mut self, payload: &str);
}

/// Notifier for devices without peers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPeers;

impl PeerNotifier for NoPeers {
    fn notify(&mut self, _payload: &str) {}
}
