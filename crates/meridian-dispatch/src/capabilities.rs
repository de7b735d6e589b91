//! Environment capability detection.

use std::sync::{Arc, OnceLock};
use std::thread;

use crossbeam_channel::bounded;

use crate::Transferable;

/// What the host environment supports for compute units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Buffers can be handed to a compute unit without copying.
    pub transfer_supported: bool,
    /// Precompiled binary compute modules can be loaded.
    pub binary_modules_supported: bool,
}

impl Capabilities {
    /// Detect the capabilities of the current process.
    ///
    /// The transfer probe runs once; later calls reuse its result. Compute
    /// units share this process, so detection always reports both
    /// capabilities. Hosts that cannot share buffers or load binary modules
    /// pass their own value through `DispatcherOptions::capabilities`, which
    /// is the only way to reach the copying and fallback paths.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<Capabilities> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            let detected = Capabilities {
                transfer_supported: probe_transfer_support(),
                binary_modules_supported: true,
            };
            tracing::debug!(?detected, "detected compute capabilities");
            detected
        })
    }
}

/// Send a buffer through a throwaway compute unit and check that the same
/// allocation comes back.
///
/// Threads share one address space, so this holds in every process that can
/// spawn a thread. It returns `false` only when the thread cannot be started.
pub fn probe_transfer_support() -> bool {
    let (to_unit, unit_inbox) = bounded::<Transferable>(1);
    let (unit_outbox, from_unit) = bounded::<Transferable>(1);

    let spawned = thread::Builder::new()
        .name("transfer-probe".to_string())
        .spawn(move || {
            if let Ok(buffer) = unit_inbox.recv() {
                let _ = unit_outbox.send(buffer);
            }
        });
    let Ok(handle) = spawned else {
        return false;
    };

    let probe: Transferable = Arc::from(vec![0_u8; 1]);
    let supported = to_unit.send(Arc::clone(&probe)).is_ok()
        && from_unit
            .recv()
            .is_ok_and(|returned| Arc::ptr_eq(&returned, &probe));

    drop(to_unit);
    let _ = handle.join();
    supported
}
