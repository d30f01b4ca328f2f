pub mod connection;
pub mod error;
pub mod state;
pub mod templates;

pub use connection::Session;
pub use error::SessionError;
pub use state::SessionState;
pub use templates::MessageTemplates;
