//! Core of the regional building-report portal: field report ingest, the
//! review workflow, priority scoring and the cached executive dashboards.

pub mod analytics;
pub mod app;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod domain;
pub mod error;
pub mod ids;
pub mod logging;
pub mod pagination;
pub mod priority;
pub mod repositories;
pub mod services;

pub use app::AppState;
pub use context::RequestContext;
pub use error::{CoreError, CoreResult};
