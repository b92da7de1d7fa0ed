//! Translation of provider output into the data stream protocol consumed by
//! the `useChat` client.
//!
//! A turn is a lazy sequence of [`Frame`]s driven by a [`Translator`]; a
//! [`Protocol`] decides how each frame is written to the wire.

pub mod frame;
pub mod protocol;
pub mod translator;

pub use frame::Frame;
pub use protocol::Protocol;
pub use translator::Translator;
