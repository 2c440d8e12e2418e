pub mod ai;
pub mod config;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

#[cfg(feature = "ui")]
pub mod ui;
#[cfg(feature = "ui")]
pub mod views;
