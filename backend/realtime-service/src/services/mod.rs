pub mod auth;
pub mod user_directory;

pub use auth::Claims;
pub use user_directory::{PgUserDirectory, UserDirectory};
