//! Band split tuner driver: session wiring and command line front end.

#[cfg(feature = "cli")]
pub mod cli;
pub mod session;

#[cfg(feature = "cli")]
pub use cli::*;
pub use session::*;
