//! Conversational AI backends.
//!
//! - [`chat`]: chat completions driving the ACS-managed STT/TTS pipeline
//! - [`realtime`]: audio-to-audio sessions over a model WebSocket
//! - [`media`]: ACS media streaming frames shared with the media bridge
//! - [`prompts`]: personas, fixed prompts and operation contexts

pub mod chat;
pub mod media;
pub mod prompts;
pub mod realtime;

pub use chat::{AgentReply, ChatConfig, ChatError, ChatMessage, ChatService, parse_agent_reply};
pub use media::{InboundFrame, OutboundFrame};
pub use prompts::{AgentPersona, build_instructions};
pub use realtime::{
    MediaSink, RealtimeBackend, RealtimeConfig, RealtimeError, RealtimeProvider,
    RealtimeSessionManager, SessionHandle,
};
