pub mod api;
pub mod backoff;
pub mod error;
pub mod settings;
pub mod worker;

pub use api::{fetch_configuration, AccountApi, HttpApi, PingReply, UserProfile};
pub use backoff::Backoff;
pub use error::ApiError;
pub use settings::{WorkerSettings, API_BASE};
pub use worker::{AccountWorker, WorkerHandle, WorkerIdentity};
