#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod api;
pub mod background;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod host;
pub mod identity;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use coordinator::RuleCoordinator;
pub use error::{PimsError, Result};
pub use host::Host;
