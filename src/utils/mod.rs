//! Small filesystem helpers shared by config and the database manager

pub mod path;
