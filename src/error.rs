use thiserror::Error;

/// Errors returned by timer handle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    /// The handle was not produced by a timer constructor (e.g. `Timer::default()`).
    #[error("timer: {op} called on uninitialized Timer")]
    Uninitialized { op: &'static str },
}

pub type Result<T> = std::result::Result<T, TimerError>;
