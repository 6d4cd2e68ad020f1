pub mod accounts;
pub mod config;
pub mod event_log;
pub mod fingerprint;
pub mod stats;

pub use accounts::{
    device_id_for, load_proxies, load_tokens, mask_token, normalize_token, parse_proxy,
    ProxySpec,
};
pub use config::{positive_secs, GlobalConfig, DEFAULT_EXTENSION_VERSION};
pub use event_log::{EventAction, EventLog, EventOutcome, EventRow};
pub use fingerprint::{CpuArch, Fingerprint, OsFamily};
pub use stats::{WorkerStats, WorkerStatus};

pub type WorkerName = String;
