//! Program and media loaders: S-record images, paper-tape text images, and
//! the device configuration file format.

pub mod config;
pub mod srec;
pub mod tape_text;

pub use config::{Config, ConfigError, DeviceBlock};
pub use srec::{LoaderError, SrecImage};
pub use tape_text::TapeTextError;
