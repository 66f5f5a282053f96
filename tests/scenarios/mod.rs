//! Scenario Tests for multilands
//!
//! - Battle: start, attack, flee, win, concurrency
//! - Characters: vitals clamping, selection, attack lookup
//! - Api: HTTP dispatch and embed payloads

pub mod api;
pub mod battle;
pub mod characters;
