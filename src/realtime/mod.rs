//! Real-Time Fan-out (C7): per-entity broadcast rooms and the WebSocket
//! handler that bridges a negotiation's room to a live client connection.

pub mod events;
pub mod rooms;
pub mod ws;

pub use events::RoomEvent;
pub use rooms::RoomRegistry;
pub use ws::{negotiation_ws, RealtimeState};
