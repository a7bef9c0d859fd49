//! Change notification plumbing.
//!
//! Defines the [`ChangeNotifier`] contract that listeners and the dropin
//! monitor bind to, a polling implementation on top of `notify`, and a small
//! subscriber registry used for configuration and record change callbacks.

pub mod notifier;
pub mod subscriber;

#[cfg(feature = "file-watch")]
pub mod watcher;

pub use notifier::{ChangeNotifier, ChangeSet, ChangeSink, WatchId, WatchOptions, WatchRequest};
pub use subscriber::{SubscriberRegistry, SubscriptionHandle};

#[cfg(feature = "file-watch")]
pub use watcher::PollingNotifier;
