//! Memory Pressure Observer Bus (C4): a process-wide `[0,1]` pressure
//! signal with subscribe/unsubscribe, feeding the cache and task engine.

pub mod bus;
pub mod sampler;
pub mod types;

pub use bus::PressureBus;
pub use sampler::SystemMemoryInfo;
pub use types::{
    MemoryPressureLevel, PressureCallback, PressureConfig, PressureObserver, SubscriptionId,
};
