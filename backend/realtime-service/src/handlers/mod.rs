pub mod presence;
pub mod websocket;
