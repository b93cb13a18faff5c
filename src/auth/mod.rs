//! Authentication and authorization for Growest Connect
//!
//! Provides:
//! - JWT session tokens issued at sign-up and login
//! - Password hashing with Argon2
//! - Closed role and user-category enums
//! - Session snapshots resolved from the profile and subscription rows

pub mod jwt;
pub mod password;
pub mod roles;
pub mod session;

pub use jwt::{
    extract_token_from_header, extract_token_from_url, Claims, JwtValidator, TokenInput,
    TokenValidationResult,
};
pub use password::{hash_password, verify_password};
pub use roles::{is_role_allowed, Role, UserType};
pub use session::{Identity, Session, SessionContext, SessionResolver};
