//! These models represent the objects passed around by the relay
//!
//! There are several different related formats we need to interact with:
//! - vercel useChat messages, sent from the interface to the relay
//! - vercel data stream frames, sent from the relay to the interface
//! - openai chat completion messages/tools, sent from the relay to the LLM
//! - gemini contents/function declarations, sent from the relay to the LLM
//!
//! Client messages are converted into the openai-shaped [`message::ProviderMessage`]
//! as soon as they arrive, and every provider adapts from that shape. Because of that
//! the provider messages are not an exact match for the gemini format.
pub mod message;
pub mod role;
pub mod tool;
