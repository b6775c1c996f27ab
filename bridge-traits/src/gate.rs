//! Capability Gate
//!
//! The host application owns the rules deciding whether the current user may
//! capture evidence (roles, assignment, feature flags). The core consumes only
//! the resulting yes/no answer.

/// Host-provided predicate guarding the capture flow.
///
/// Called once before a capture session is handed out; the answer is not
/// re-checked while that session is alive.
#[cfg_attr(test, mockall::automock)]
pub trait CapabilityGate: Send + Sync {
    fn can_capture(&self) -> bool;
}

/// Gate that always permits capture. Useful for hosts without access rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CapabilityGate for AllowAll {
    fn can_capture(&self) -> bool {
        true
    }
}

/// Gate that always refuses capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl CapabilityGate for DenyAll {
    fn can_capture(&self) -> bool {
        false
    }
}
