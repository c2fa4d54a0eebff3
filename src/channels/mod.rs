//! Light channel state: threshold evaluation and debouncing.

mod bank;
mod threshold;

pub use bank::{Channel, ChannelBank};
pub use threshold::{evaluate, is_active, resolve_thresholds, ActivationVector};
