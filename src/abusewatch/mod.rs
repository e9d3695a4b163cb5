pub mod aggregation;
pub mod alert;
pub mod config;
pub mod criteria;
pub mod error;
pub mod event;
pub mod geo;
pub mod lists;
pub mod pipeline;
pub mod side_input;
pub mod state;
pub mod window;

/// Initialize the `env_logger` backend for the `log` facade.
///
/// Safe to call more than once; subsequent calls are ignored. Honors `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
