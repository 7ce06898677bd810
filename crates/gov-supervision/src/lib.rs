//! # gov-supervision
//!
//! Live supervision of high-risk actions taken by SUPERVISED-tier agents.
//!
//! A [`SupervisionSession`] starts `active` and can be paused, corrected,
//! and resumed any number of times before it ends `terminated` or
//! `completed`. Corrections are written to the agent's intervention history,
//! where graduation checks read them back.

pub mod coordinator;
pub mod error;
pub mod session;

pub use coordinator::SupervisionCoordinator;
pub use error::SupervisionError;
pub use session::{Correction, Intervention, SessionState, SupervisionSession};
