//! Version model for installable units
//!
//! This crate provides the version and version range types used by the
//! resolver: four-segment versions (`major.minor.micro.qualifier`) and
//! interval ranges written as `[1.0,2.0)`.

mod error;
mod range;
mod version;

pub use error::VersionError;
pub use range::VersionRange;
pub use version::Version;
