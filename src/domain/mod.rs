pub mod conflict;
pub mod models;
pub mod palette;
pub mod statistics;
