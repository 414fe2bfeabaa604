//! Process-wide plumbing shared by the follower binaries.

pub mod logging;
