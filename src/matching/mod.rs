//! Matching Engine (C3) and Match Token Store (C4): push-only candidate
//! discovery, weighted scoring, optimistic-lock reservation, and the
//! anonymized handle layer between a surviving match and a negotiation.

pub mod engine;
pub mod geo;
pub mod queue;
pub mod scoring;
pub mod token;

pub use engine::{MatchOutcome, MatchingEngine};
pub use queue::{EnqueueOutcome, MatchJob, MatchQueue, MatchQueueReceivers, Priority};
pub use scoring::ScoreBreakdown;
pub use token::{DisclosureLevel, MatchToken, MatchTokenStore, MatchTokenView, TokenSide};
