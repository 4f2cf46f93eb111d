// Authentication module
// JWT-based admin authentication for the management endpoints

pub mod error;
pub mod middleware;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use middleware::AdminSession;
pub use token::{Claims, Role, TokenService};
