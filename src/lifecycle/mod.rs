//! Lifecycle Module
//!
//! Ordered states, the state machine that enforces them, and the
//! [`Lifecycle`] trait implemented by contexts, object definitions and
//! applications.
//!
//! # States
//!
//! ```text
//! NOT_STARTED (0)
//!    ↓
//! INSTANTIATING (100)        ← object definitions only
//!    ↓
//! INSTANTIATED (200)         ← object definitions only
//!    ↓
//! SETTING_PROPERTIES (300)   ← object definitions only
//!    ↓
//! PROPERTIES_SET (400)       ← object definitions only
//!    ↓
//! STARTING (1000)
//!    ↓
//! STARTED (2000)
//!    ↓
//! STOPPING (10000)
//!    ↓
//! STOPPED (10001)
//! ```
//!
//! A transition to a lower rank fails, a transition to the current rank is a
//! silent no-op.

mod error;
mod machine;
mod state;
mod traits;

pub use error::LifecycleError;
pub use machine::{LifecycleEvent, PhaseClaim, StateMachine};
pub use state::LifecycleState;
pub use traits::Lifecycle;
