//! Application layer containing the core business logic orchestration.
//!
//! This module defines the `LedgerEngine` which acts as the primary entry
//! point for processing operations, together with the collaborators it
//! composes: the idempotency guard, risk evaluator, lock manager, funds
//! mover and approval workflow.

pub mod approval;
pub mod engine;
pub mod funds;
pub mod guard;
pub mod lock;
pub mod risk;
