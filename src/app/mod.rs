//! Application change monitoring.
//!
//! An application is described by an [`AppDescriptor`] and registered with
//! the [`ApplicationChangeMonitor`]. Each registration owns listeners bound to
//! its content root and targets; their verdicts are debounced for
//! [`DEBOUNCE_WINDOW`] and coalesced into a single [`UpdateHandler`] call.

mod descriptor;
mod listener;
mod monitor;
mod registration;
mod suffix;

pub use descriptor::{AppDescriptor, Redefiner, UpdateHandler};
pub use listener::ListenerKind;
pub use monitor::ApplicationChangeMonitor;
pub use registration::{DEBOUNCE_WINDOW, UpdateKind};
pub use suffix::{BUILTIN_MINOR_UPDATE_SUFFIXES, MinorUpdateSuffixes};
