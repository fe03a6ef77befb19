#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;
mod reconciler;
mod scheduler;
mod state;


pub use self::{
    metrics::ReconcileMetrics,
    reconciler::{Reconciler, TickReport},
    scheduler::{run, SharedReconciler},
    state::RegistryState,
};
