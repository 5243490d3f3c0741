//! Negotiation Engine (C5): stateful alternating-offer protocol with chat,
//! optional AI hints, expiry, and real-time fan-out hooks.

pub mod ai;
pub mod engine;
pub mod model;

pub use ai::{should_auto_accept, suggest_counter, AutoAcceptTolerance, SuggestedCounter};
pub use engine::NegotiationEngine;
pub use model::{
    MessageSender, Negotiation, NegotiationMessage, NegotiationOffer, NegotiationStatus, OfferStatus, Side,
};
