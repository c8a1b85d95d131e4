// -
// Memory source

/// Events kept per collection for watch resumption
pub(crate) const MEMORY_SOURCE_HISTORY: usize = 1024;

/// Per-collection broadcast buffer; slower watchers see `Expired`
pub(crate) const MEMORY_SOURCE_WATCH_BUFFER: usize = 256;

// -
// Config

/// Environment variable prefix, e.g. `DYNCACHE__CACHE__NAMESPACE`
pub(crate) const ENV_PREFIX: &str = "DYNCACHE";

/// Points at an optional config file layered over the defaults
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Log file name under `demo.log_dir`
pub const LOG_FILE_NAME: &str = "dynamic-cache.log";
