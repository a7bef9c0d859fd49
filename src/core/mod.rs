//! Core configuration and lifecycle types.

mod app_monitor;
mod builder;
mod config;
mod config_cell;
mod loader;

#[cfg(feature = "validation")]
mod validation;

pub use app_monitor::AppMonitor;
pub use builder::AppMonitorBuilder;
pub use self::config::{
    DEFAULT_DROPINS_LOCATION, DEFAULT_POLLING_RATE, MonitorConfig, MonitorConfigUpdate, TriggerMode,
    parse_duration,
};
pub use config_cell::{ConfigCell, ConfigChange};
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};

#[cfg(feature = "validation")]
pub use validation::Validate;
