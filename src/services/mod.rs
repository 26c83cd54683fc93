//! Domain services used by the session dispatcher.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the grouping rules so the session can stay focused
//! on frame translation and outbox plumbing.

pub mod groups;
