pub mod analyze;
pub mod config;
pub mod dataset;
pub mod document;
pub mod error;
pub mod import;
pub mod io_utils;
pub mod query;
pub mod schema;
pub mod service;
pub mod validate;
pub mod value;
pub mod xml;
pub mod xpath;
pub mod xsd;

use std::{env, sync::OnceLock};

use log::LevelFilter;

pub use crate::{
    config::CoreConfig,
    error::{CoreError, Result},
    service::DatasetService,
};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Initialize the process-wide logger once. Embedding transports may call
/// this freely; later calls are no-ops.
pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tabxml", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}
