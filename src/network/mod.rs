pub mod session;

pub use session::{NetworkParams, NetworkSession, SessionError, SessionManager};
