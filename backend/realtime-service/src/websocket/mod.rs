pub mod broadcaster;
pub mod messages;
pub mod registry;
pub mod rooms;
pub mod sweeper;

pub use broadcaster::Broadcaster;
pub use messages::ClientMessage;
pub use registry::{ConnectionRecord, ConnectionRegistry, ConnectionSender};
pub use rooms::RoomRouter;
pub use sweeper::PresenceService;
