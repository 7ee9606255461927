//! Configuration for hive workers.
//!
//! Three layers decide the tuning a worker thread actually uses:
//!
//! 1. Process-wide defaults ([`defaults`], [`set_defaults`]), seeded from the
//!    config file and environment at startup.
//! 2. Per-thread overrides ([`overlay`]), visible only to the thread that set
//!    them and discarded when it exits.
//! 3. [`overlay::effective`], which merges the two for the calling thread.
//!
//! ```
//! use hive_config::overlay::{self, OptionValue, WorkerOption};
//! use std::time::Duration;
//!
//! overlay::set(WorkerOption::SleepDelay, OptionValue::Duration(Duration::from_secs(11))).unwrap();
//! assert_eq!(overlay::effective().sleep_delay, Duration::from_secs(11));
//! ```

pub mod file;
pub mod overlay;
pub mod params;
pub mod settings;

pub use file::{HiveConfig, ManagerConfig};
pub use overlay::{OptionValue, WorkerOption};
pub use params::Parameters;
pub use settings::{WorkerSettings, defaults, reset_defaults, set_defaults};
