pub mod deployment;
pub mod envvar;
pub mod error;
pub mod service;
pub mod token;
pub mod worker;

pub use error::{Error, Result};
