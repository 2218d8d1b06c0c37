//! Protocol versioning for daemon IPC communication.
//!
//! Breaking changes (removing fields or variants, changing field types,
//! renaming without `#[serde(alias)]`) require a `PROTOCOL_VERSION` bump.
//! Additive changes behind `#[serde(default)]` are safe without one.
//!
//! We maintain N-1 backwards compatibility: bump `PROTOCOL_VERSION` for
//! breaking changes and only move `MIN_SUPPORTED_VERSION` forward when
//! dropping support for old builds.

/// Current protocol version. Bump when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Minimum protocol version this build can communicate with.
pub const MIN_SUPPORTED_VERSION: u32 = 1;
