//! Client-side registration state for event cards.
//!
//! [`RegistrationController`] applies registrations optimistically and rolls
//! back the exact attempt the server rejected. Cancellations wait for the
//! server. All auth context travels in an explicit [`Session`].

pub mod api;
pub mod card;
pub mod controller;
pub mod session;

pub use api::{ApiError, HttpRegistrationApi, RegistrationApi};
pub use card::{AttemptId, CardError, CardState, EventCard};
pub use controller::{ControllerError, RegistrationController};
pub use session::{ClientConfig, Session};
