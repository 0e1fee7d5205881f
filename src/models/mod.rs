//! Domain documents persisted through the store collaborator.

pub mod access_code;
pub mod emergency;
pub mod peer;
pub mod session;
pub mod usage_log;

pub use access_code::AccessCode;
pub use emergency::{EmergencyMessage, Hop, MessageType, Priority};
pub use peer::{Capabilities, CapabilityUpdate, LocationUpdate, Peer, PeerLocation};
pub use session::{Session, SessionQuality, SessionStatus};
pub use usage_log::{UsageLog, UsageReporter};
