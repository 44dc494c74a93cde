//! Switchboard: multi-provider chat middleware.
//!
//! Inbound webhooks from LINE and Facebook Messenger are normalized into one
//! event model, routed through a flow state machine that collects the
//! parameters a skill needs, and answered with messages that are compiled
//! into whichever provider schema the conversation is on.
//!
//! See `DESIGN.md` for the module ledger.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod compiler;
pub mod config;
pub mod context;
pub mod event;
pub mod flow;
pub mod intent;
pub mod logging;
pub mod provider;
pub mod skill;
pub mod store;
pub mod toolkit;
pub mod transport;
pub mod webhook;
