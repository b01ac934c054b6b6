// parkwatch-api: Socket.IO feed transport for live occupancy updates

pub mod error;
pub mod feed;
pub mod protocol;

pub use error::Error;
pub use feed::{FeedEvent, FeedHandle, FeedOptions, ReconnectConfig, socket_io_url};
