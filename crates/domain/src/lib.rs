//! Domain-level building blocks shared by the monitor, the plugin router and
//! the binary: ledger model, lifecycle events, source traits, configuration
//! and telemetry.

pub mod component;
pub mod config;
pub mod model;
pub mod services;

pub mod source {
    mod traits;

    pub use traits::*;
}

pub use component::{Component, ComponentError};
pub use model::*;
pub use source::*;
