//! Database repositories
//
// Upload job queue (Postgres + in-memory)
pub mod jobs;
//
// Image fields of user and dog records
pub mod owners;
