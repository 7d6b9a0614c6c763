pub mod aggregate;
pub mod config;
pub mod emission;
pub mod error;
pub mod extract;
pub mod io;
pub mod layout;
pub mod model;
pub mod progress;
pub mod reference;
pub mod run;
pub mod validate;
pub mod workflow;

pub use error::{Result, ToolError};
