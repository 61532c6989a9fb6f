pub mod constants;
pub mod event;
pub mod region;

// Re-export primary types for convenience.
pub use constants::EventType;
pub use event::{FrameError, InboundEvent, heartbeat_frame};
pub use region::{CacheRegionTag, RegionKind};
