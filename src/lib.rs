#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod cli;
pub mod completion;
pub mod config;
pub mod display;
pub mod error;
pub mod session;
pub mod sync;
