//! Tracker module
//!
//! Session state: which downloads exist, how they relate and what the
//! engine last reported about each of them.

pub mod events;
pub mod graph;
pub mod task;

pub use events::{EventBus, TaskEvent, DEFAULT_EVENT_CAPACITY};
pub use graph::{TaskGraph, TaskSource};
pub use task::Task;
