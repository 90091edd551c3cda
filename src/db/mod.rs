//! User store for the todo-list server.
//!
//! Credential lookup and account creation; everything else about users
//! lives outside the authentication core.

pub mod models;
pub mod operations;

pub use models::{NewUser, User};
pub use operations::{DbOperations, UserStore};
