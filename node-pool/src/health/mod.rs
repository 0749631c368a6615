pub mod latency;
pub(crate) mod pinger;

pub use latency::{LatencyWindow, LATENCY_WINDOW, UNPROBED_LATENCY};
