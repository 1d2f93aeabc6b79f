pub mod block_store;
pub mod bootstrap;
pub mod commands;
