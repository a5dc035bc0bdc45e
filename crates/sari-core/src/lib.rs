pub mod assemble;
pub mod collab;
pub mod config;
pub mod error;
pub mod gather;
pub mod io;
pub mod issue;
pub mod model;
pub mod paths;
pub mod period;
pub mod pipeline;
pub mod pool;
pub mod records;
pub mod schema;
pub mod secrets;
pub mod status;
pub mod wildcard;

#[cfg(test)]
mod testing;

pub use error::{Result, SariError};
