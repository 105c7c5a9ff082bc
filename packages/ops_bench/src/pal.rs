//! Platform abstraction layer for timer sources.
//!
//! This module allows switching between the real timer sources of the operating system
//! and a fake implementation that tests can drive deterministically.

mod abstractions;
mod facade;
#[cfg(test)]
mod fake;
mod real;

pub(crate) use abstractions::Platform;
pub(crate) use facade::PlatformFacade;
#[cfg(test)]
pub(crate) use fake::FakePlatform;
pub(crate) use real::RealPlatform;
