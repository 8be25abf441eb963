//! Stream event protocol: the wire shape of a single stream event.
//!
//! This crate defines [`ProtocolEvent`], the flat `{type, task_id, iteration,
//! payload}` event carried on a task's output stream (§6 "Event stream
//! (produced)"). It does not depend on `weave`; `weave::events::EventSink`
//! wraps `ProtocolEvent` and sends it on the task's output channel.

pub mod event;

pub use event::ProtocolEvent;
