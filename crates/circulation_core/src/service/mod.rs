//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into circulation use-cases.
//! - Own transaction boundaries; repositories never open their own.

pub mod alert_service;
pub mod messages;
pub mod sweep_service;
pub mod workflow_service;
