use crate::{config::Config, services::UserDirectory, websocket::PresenceService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// User-lookup collaborator consumed during the handshake
    pub directory: Arc<dyn UserDirectory>,
    /// Registry, room router, broadcast facade, and sweeper
    pub presence: Arc<PresenceService>,
}
