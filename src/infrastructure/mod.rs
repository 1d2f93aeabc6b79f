pub mod config;
pub mod diagnostics;
pub mod error;
pub mod key_value;
pub mod storage;
