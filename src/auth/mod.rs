mod helpers;
mod middleware;
mod oauth_state;
mod session;
mod token;

pub use helpers::{SessionValidationError, extract_bearer};
pub use middleware::{AuthError, RequireUser};
pub use oauth_state::PendingStates;
pub use session::{SessionIssuer, SessionTokens};
pub use token::{GeneratedToken, TokenGenerator, parse_token};
