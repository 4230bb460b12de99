//! Database layer for the aggregator's reservation table.
//!
//! ```text
//! ┌──────────────────┐
//! │ store::PgStore   │  (trait impls used by the dispatcher and the bot)
//! └────────┬─────────┘
//!          │ one pooled connection per call
//!          ↓
//! ┌──────────────────┐
//! │ handlers         │  (repositories: parameterised queries)
//! └────────┬─────────┘
//!          ↓
//! ┌──────────────────┐
//! │ models           │  (row structs and the status enum)
//! └────────┬─────────┘
//!          ↓
//! ┌──────────────────┐
//! │ PostgreSQL       │
//! └──────────────────┘
//! ```
//!
//! The `reservations` table is written by the upstream aggregator. This crate only ever updates
//! the `message_sent` flag, one row at a time. The migration in `migrations/` creates the table
//! when it does not exist yet (fresh development databases) and adds the index the dispatcher's
//! poll relies on.

pub mod errors;
pub mod handlers;
pub mod models;
