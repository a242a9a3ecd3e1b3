//! Network infrastructure for the kiosk application.
//!
//! # Sub-modules
//!
//! - **`presence_responder`** – Binds the well-known presence port, answers
//!   dashboards' `status-request` datagrams, and pushes the kiosk's
//!   heartbeat to every dashboard that has polled recently.  Implements
//!   [`scan_core::PresenceChannel`] so the presence announcer can run over
//!   it unchanged.

pub mod presence_responder;
