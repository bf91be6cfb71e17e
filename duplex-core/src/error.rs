use std::fmt;

/// Which end of the list a sentinel node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sentinel {
    Head,
    Tail,
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentinel::Head => f.write_str("head"),
            Sentinel::Tail => f.write_str("tail"),
        }
    }
}

/// Errors returned by node operations.
///
/// Lost CAS races are retried internally and never show up here.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ListError {
    /// Value access on a node that never carries a value.
    #[error("the {0} sentinel does not hold a value")]
    Sentinel(Sentinel),
}

pub type Result<T> = std::result::Result<T, ListError>;
