//! Process-wide readiness of the numeric backend.
//!
//! [`initialize`] must succeed once before any operator is created. It is idempotent;
//! teardown happens implicitly at process exit.

use std::sync::OnceLock;

use derive_more::Display;

use crate::hal::ops::OperatorError;

/// Instruction set the lookup kernels were selected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Isa {
    #[display("sse2")]
    Sse2,
    #[display("neon")]
    Neon,
    #[display("portable")]
    Portable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub isa: Isa,
}

static PLATFORM: OnceLock<Platform> = OnceLock::new();

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn detect() -> Option<Isa> {
    std::arch::is_x86_feature_detected!("sse2").then_some(Isa::Sse2)
}

#[cfg(target_arch = "aarch64")]
fn detect() -> Option<Isa> {
    std::arch::is_aarch64_feature_detected!("neon").then_some(Isa::Neon)
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64", target_arch = "aarch64")))]
fn detect() -> Option<Isa> {
    Some(Isa::Portable)
}

/// Detects CPU capabilities and marks the backend ready.
///
/// Fails with [`OperatorError::InsufficientResources`] if the CPU lacks the baseline
/// instruction set. A failed call may be retried; calls after the first success are no-ops.
pub fn initialize() -> Result<(), OperatorError> {
    if PLATFORM.get().is_some() {
        return Ok(());
    }
    let Some(isa) = detect() else {
        log::error!("failed to initialize: cpu lacks the baseline instruction set");
        return Err(OperatorError::InsufficientResources(
            "unsupported cpu".into(),
        ));
    };
    if PLATFORM.set(Platform { isa }).is_ok() {
        log::debug!("initialized with {isa} kernels");
    }
    Ok(())
}

/// Returns the initialized platform, if [`initialize`] has succeeded.
#[inline]
pub fn platform() -> Option<Platform> {
    PLATFORM.get().copied()
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::{initialize, platform};

    #[test]
    fn test_initialize_idempotent() -> Result<(), Box<dyn Error>> {
        initialize()?;
        let first = platform();
        assert!(first.is_some());

        initialize()?;
        assert_eq!(platform(), first);
        Ok(())
    }
}
