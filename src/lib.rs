//! Real-time traffic-telemetry downsampling.
//!
//! A [`service::SamplingService`] owns a dual-resolution [`sampling::Sampler`]
//! and broadcasts throttled snapshots to subscribers. A [`refcount::RefCounter`]
//! tracks attached consumers so producers only run while someone is watching.

pub mod config;
pub mod feed;
pub mod handlers;
pub mod middleware;
pub mod refcount;
pub mod sampling;
pub mod server;
pub mod service;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    /// Front door to the sampling service — producers append, consumers query.
    pub sampler: service::SamplingHandle,

    /// Attached-consumer count; gates the producer.
    pub subscribers: refcount::RefCounter,
}
