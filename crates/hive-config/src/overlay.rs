//! Per-thread overrides of worker settings.
//!
//! Each thread owns an overlay created on its first [`set`]. An option counts
//! as overridden only once it has been explicitly assigned, so an override
//! holding `None` or an empty list still shadows the process-wide default.
//! The overlay lives in thread-local storage and disappears with its thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use hive_core::{HiveError, Result};

use crate::settings::{WorkerSettings, defaults};

/// A tunable worker option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerOption {
    MinPriority,
    MaxPriority,
    SleepDelay,
    ReadAhead,
    Queues,
    ExitOnComplete,
}

impl WorkerOption {
    /// All options, in declaration order.
    pub const ALL: [WorkerOption; 6] = [
        Self::MinPriority,
        Self::MaxPriority,
        Self::SleepDelay,
        Self::ReadAhead,
        Self::Queues,
        Self::ExitOnComplete,
    ];

    /// Option name as used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MinPriority => "min_priority",
            Self::MaxPriority => "max_priority",
            Self::SleepDelay => "sleep_delay",
            Self::ReadAhead => "read_ahead",
            Self::Queues => "queues",
            Self::ExitOnComplete => "exit_on_complete",
        }
    }

    /// Read this option out of a settings value.
    pub fn read(&self, settings: &WorkerSettings) -> OptionValue {
        match self {
            Self::MinPriority => OptionValue::Priority(settings.min_priority),
            Self::MaxPriority => OptionValue::Priority(settings.max_priority),
            Self::SleepDelay => OptionValue::Duration(settings.sleep_delay),
            Self::ReadAhead => OptionValue::Count(settings.read_ahead),
            Self::Queues => OptionValue::Queues(settings.queues.clone()),
            Self::ExitOnComplete => OptionValue::Flag(settings.exit_on_complete),
        }
    }

    fn accepts(&self, value: &OptionValue) -> bool {
        matches!(
            (self, value),
            (Self::MinPriority | Self::MaxPriority, OptionValue::Priority(_))
                | (Self::SleepDelay, OptionValue::Duration(_))
                | (Self::ReadAhead, OptionValue::Count(_))
                | (Self::Queues, OptionValue::Queues(_))
                | (Self::ExitOnComplete, OptionValue::Flag(_))
        )
    }

    fn write(&self, settings: &mut WorkerSettings, value: &OptionValue) {
        match (self, value) {
            (Self::MinPriority, OptionValue::Priority(p)) => settings.min_priority = *p,
            (Self::MaxPriority, OptionValue::Priority(p)) => settings.max_priority = *p,
            (Self::SleepDelay, OptionValue::Duration(d)) => settings.sleep_delay = *d,
            (Self::ReadAhead, OptionValue::Count(n)) => settings.read_ahead = *n,
            (Self::Queues, OptionValue::Queues(q)) => settings.queues = q.clone(),
            (Self::ExitOnComplete, OptionValue::Flag(f)) => settings.exit_on_complete = *f,
            // `set` rejects mismatched kinds before they reach the overlay
            _ => {}
        }
    }
}

impl fmt::Display for WorkerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerOption {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|opt| opt.as_str() == s)
            .ok_or_else(|| HiveError::config_validation(s, "unknown worker option"))
    }
}

/// Value of a [`WorkerOption`].
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Priority(Option<i32>),
    Duration(Duration),
    Count(u32),
    Queues(Vec<String>),
    Flag(Option<bool>),
}

thread_local! {
    static OVERLAY: RefCell<Option<HashMap<WorkerOption, OptionValue>>> = const { RefCell::new(None) };
}

/// The calling thread's value for `option`, falling back to the process default.
pub fn get(option: WorkerOption) -> OptionValue {
    OVERLAY
        .with_borrow(|overlay| overlay.as_ref().and_then(|map| map.get(&option).cloned()))
        .unwrap_or_else(|| option.read(&defaults()))
}

/// Override `option` for the calling thread only.
pub fn set(option: WorkerOption, value: OptionValue) -> Result<()> {
    if !option.accepts(&value) {
        return Err(HiveError::config_validation(
            option.as_str(),
            format!("value {value:?} has the wrong kind"),
        ));
    }
    OVERLAY.with_borrow_mut(|overlay| {
        overlay.get_or_insert_with(HashMap::new).insert(option, value);
    });
    Ok(())
}

/// Whether the calling thread has explicitly overridden `option`.
pub fn has(option: WorkerOption) -> bool {
    OVERLAY.with_borrow(|overlay| overlay.as_ref().is_some_and(|map| map.contains_key(&option)))
}

/// Drop the calling thread's override of `option`.
pub fn unset(option: WorkerOption) {
    OVERLAY.with_borrow_mut(|overlay| {
        if let Some(map) = overlay.as_mut() {
            map.remove(&option);
        }
    });
}

/// Drop every override held by the calling thread.
pub fn clear() {
    OVERLAY.with_borrow_mut(|overlay| *overlay = None);
}

/// Apply every override in `overrides` to the calling thread.
pub fn apply<I>(overrides: I) -> Result<()>
where
    I: IntoIterator<Item = (WorkerOption, OptionValue)>,
{
    for (option, value) in overrides {
        set(option, value)?;
    }
    Ok(())
}

/// Process defaults with the calling thread's overrides laid on top.
pub fn effective() -> WorkerSettings {
    let mut settings = defaults();
    OVERLAY.with_borrow(|overlay| {
        if let Some(map) = overlay {
            for (option, value) in map {
                option.write(&mut settings, value);
            }
        }
    });
    settings
}
