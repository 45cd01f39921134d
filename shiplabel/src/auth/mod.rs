//! Login gate for the label generator.
//!
//! Browsers authenticate with a username and password at `/login` and receive a signed session
//! token in an HTTP-only cookie. Handlers that require a logged-in user take a
//! [`current_user::CurrentUser`] argument; the extractor rejects anonymous requests with `401`.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor for the authenticated user
//! - [`password`]: Password hashing and verification using Argon2
//! - [`session`]: Session token creation and verification
//! - [`users`]: Credential lookup capability and its in-memory implementation

pub mod current_user;
pub mod password;
pub mod session;
pub mod users;
