mod auth;
mod session;
mod storage;

pub use auth::EXPIRY_MARGIN_SECS;
pub use auth::TokenManager;
pub use session::STATE_KEY;
pub use session::SessionAuth;
pub use session::TOKEN_KEY;
pub use storage::ScratchStorage;
pub use storage::{COVERS_DIR, STATIC_ROUTE, VIDEOS_DIR};
