//! Route handlers.
//!
//! - [`auth`]: login page, login and logout
//! - [`labels`]: the label form and label generation
//!
//! Handlers that need a logged-in user take [`crate::auth::current_user::CurrentUser`] as an
//! extractor; pages take `Option<CurrentUser>` so anonymous visitors can be redirected instead.

pub mod auth;
pub mod labels;
