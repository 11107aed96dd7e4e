//! Traits implemented by the board integration to give the link engine its
//! platform services.

use heapless::Vec;

use crate::packet::{BindData, PPM_CHANNELS};

/// A monotonic clock with microsecond and millisecond views.
///
/// Both counters may wrap; the engine only ever compares spans well below
/// half the counter range.
pub trait Clock {
    /// Microseconds since an arbitrary epoch.
    fn now_us(&mut self) -> u32;
    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&mut self) -> u32;
}

/// A watchdog the driver task keeps fed.
///
/// Boards without one plug in `()`.
pub trait Watchdog {
    /// Reset the watchdog counter.
    fn kick(&mut self);
}

impl Watchdog for () {
    fn kick(&mut self) {}
}

/// Persistent storage for the bind parameter block.
pub trait BindStore {
    /// Error reported by a failed save. Save failures are logged by the
    /// engine and the session continues on the in-memory binding.
    type Error: core::fmt::Debug;

    /// Return the stored bind parameters, if any.
    fn load(&mut self) -> Option<BindData>;
    /// Persist a freshly received bind parameter block.
    fn save(&mut self, bind: &BindData) -> Result<(), Self::Error>;
}

/// Downstream consumer of decoded servo frames.
///
/// Called once per received servo packet with the raw channel values
/// (10-bit fine channels, or the coarse 3-position encoding mapped onto
/// the same scale).
pub trait PpmSink {
    /// A new servo frame has been decoded.
    fn ppm_frame(&mut self, channels: &Vec<u16, PPM_CHANNELS>);
}

/// Discard frames; the last decoded vector stays readable on the engine.
impl PpmSink for () {
    fn ppm_frame(&mut self, _channels: &Vec<u16, PPM_CHANNELS>) {}
}
