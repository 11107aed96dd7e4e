#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
//!
//! ## Feature flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]

#[macro_use]
mod fmt;

pub(crate) mod interface;
pub mod link;
pub mod mod_params;
pub mod mod_traits;
pub mod packet;
pub mod rfm22b;

#[cfg(test)]
mod test_util;

pub use link::{OpenLrs, RfModeFlag};
pub use mod_params::{Config, Error, GpioDirection, LinkPhase, LinkStats, RfMode};
pub use mod_traits::{BindStore, Clock, PpmSink, Watchdog};
pub use packet::BindData;

pub use embedded_hal::delay::DelayNs;
