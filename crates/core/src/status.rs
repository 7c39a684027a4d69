use std::fmt;

/// Status returned by every native call that reports one.
///
/// The discriminants match the raw integers used on the native boundary and
/// on the remote wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok = 0,
    Warning = 1,
    Discard = 2,
    Error = 3,
    Fatal = 4,
    Pending = 5,
}

impl Status {
    /// Converts a raw status integer, returning `None` for unknown values.
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::Warning),
            2 => Some(Self::Discard),
            3 => Some(Self::Error),
            4 => Some(Self::Fatal),
            5 => Some(Self::Pending),
            _ => None,
        }
    }

    /// Returns the raw status integer.
    #[must_use]
    pub fn to_raw(self) -> i32 {
        self as i32
    }

    /// Returns true for `Ok` and `Warning`.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::Warning)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Warning => "Warning",
            Self::Discard => "Discard",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
            Self::Pending => "Pending",
        };
        f.write_str(name)
    }
}

/// Selector for the co-simulation status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    DoStepStatus = 0,
    PendingStatus = 1,
    LastSuccessfulTime = 2,
    Terminated = 3,
}

impl StatusKind {
    #[must_use]
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::DoStepStatus),
            1 => Some(Self::PendingStatus),
            2 => Some(Self::LastSuccessfulTime),
            3 => Some(Self::Terminated),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_raw(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip_covers_every_status() {
        for raw in 0..=5 {
            let status = Status::from_raw(raw).expect("known status");
            assert_eq!(status.to_raw(), raw);
        }
        assert_eq!(Status::from_raw(6), None);
        assert_eq!(Status::from_raw(-1), None);
    }

    #[test]
    fn only_ok_and_warning_are_success() {
        assert!(Status::Ok.is_success());
        assert!(Status::Warning.is_success());
        assert!(!Status::Discard.is_success());
        assert!(!Status::Error.is_success());
        assert!(!Status::Fatal.is_success());
        assert!(!Status::Pending.is_success());
    }
}
