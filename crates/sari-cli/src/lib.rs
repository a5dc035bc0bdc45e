//! Concrete collaborators for the `sari` binary.

pub mod aws;
pub mod live;
pub mod okta;
pub mod probe;
