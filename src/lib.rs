pub mod commands;
pub mod dates;
pub mod events;
pub mod logging;
pub mod models;
pub mod projection;
pub mod state;
pub mod storage;
pub mod store;

#[cfg(feature = "cli")]
mod cli;

#[cfg(feature = "cli")]
pub use cli::run;

pub use models::{Settings, Task, TaskId};
pub use store::{LoadReport, StoreError, TaskStore};
