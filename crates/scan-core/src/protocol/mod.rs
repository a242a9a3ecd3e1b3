//! Protocol module containing the presence beacon messages and channel seam.

pub mod presence;

pub use presence::{
    LocalPresenceBus, PresenceBeacon, PresenceChannel, PresenceError, PresenceFrame,
    DEFAULT_CHANNEL,
};
