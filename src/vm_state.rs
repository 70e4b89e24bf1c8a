//! Lifecycle state of a libvirt domain, as reported by `virDomainGetState`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainState {
    NoState,
    Running,
    Blocked,
    Paused,
    Shutdown,
    Shutoff,
    Crashed,
    PmSuspended,
}

impl DomainState {
    /// Map libvirt's `virDomainState` value; unknown values become `NoState`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => DomainState::Running,
            2 => DomainState::Blocked,
            3 => DomainState::Paused,
            4 => DomainState::Shutdown,
            5 => DomainState::Shutoff,
            6 => DomainState::Crashed,
            7 => DomainState::PmSuspended,
            _ => DomainState::NoState,
        }
    }

    /// Upper-case name used in listings.
    pub fn label(self) -> &'static str {
        match self {
            DomainState::NoState => "NOSTATE",
            DomainState::Running => "RUNNING",
            DomainState::Blocked => "BLOCKED",
            DomainState::Paused => "PAUSED",
            DomainState::Shutdown => "SHUTDOWN",
            DomainState::Shutoff => "SHUTOFF",
            DomainState::Crashed => "CRASHED",
            DomainState::PmSuspended => "PMSUSPENDED",
        }
    }

    pub fn is_running(self) -> bool {
        self == DomainState::Running
    }
}

impl fmt::Display for DomainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_map_to_states() {
        assert_eq!(DomainState::from_raw(1), DomainState::Running);
        assert_eq!(DomainState::from_raw(5), DomainState::Shutoff);
        assert_eq!(DomainState::from_raw(7), DomainState::PmSuspended);
        assert_eq!(DomainState::from_raw(0), DomainState::NoState);
        assert_eq!(DomainState::from_raw(8), DomainState::NoState);
    }

    #[test]
    fn labels() {
        assert_eq!(DomainState::Running.to_string(), "RUNNING");
        assert_eq!(DomainState::PmSuspended.to_string(), "PMSUSPENDED");
        assert!(DomainState::Running.is_running());
        assert!(!DomainState::Paused.is_running());
    }
}
