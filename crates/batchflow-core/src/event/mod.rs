//! Typed publish/subscribe channels for task and workflow lifecycle events.

pub mod channel;

pub use channel::EventChannel;
