mod selector;
mod servers;

pub use selector::DEFAULT_LATENCY_TOLERANCE;
pub use servers::Servers;
