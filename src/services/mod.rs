pub mod debounce;
pub mod fs;
pub mod oneshot;
pub mod persistence_worker;
pub mod time_source;
pub mod tracing_setup;
