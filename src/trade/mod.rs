//! Trade Engine (C6): completeness validation of an accepted negotiation,
//! term-freezing, contract hashing, signature collection, and milestone
//! lifecycle tracking.

pub mod completeness;
pub mod contract;
pub mod engine;
pub mod model;

pub use completeness::{validate, validate_trade, DraftTerms};
pub use contract::{canonicalize, contract_hash};
pub use engine::TradeEngine;
pub use model::{
    Address, Amendment, BalanceTrigger, InspectionTerms, LegalTerms, Milestone, PaymentTerms, PenaltyTerms,
    QualityTerms, Signature, SignatorySide, Trade, TradeStatus,
};
