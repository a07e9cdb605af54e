//! Inbound event handling: EventGrid webhooks and ACS mid-call callbacks.

pub mod dispatcher;
pub mod types;

pub use dispatcher::{CallEventDispatcher, DispatchError, DispatchResult, OutboundCall};
pub use types::{
    AcsEventType, CallEventData, CallbackEvent, EventGridEvent, IncomingCallData, Participant,
    SubscriptionValidationData, parse_event_batch,
};
