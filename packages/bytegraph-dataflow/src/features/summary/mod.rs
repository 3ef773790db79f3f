//! Summary store and event bus shared across unit runners.

pub mod events;
pub mod store;

pub use events::AnalysisEvent;
pub use store::{event_channel, EventMailbox, EventSink, SummaryStore, DEFAULT_REPLAY_CAPACITY};
