pub mod auth;
pub mod error;
pub mod models;
pub mod push;
pub mod registration;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
