//! Tabroom-State: persistence for the Tabroom engines
//!
//! This crate owns every byte the tournament engines read or write.
//! It provides the storage traits the engines are written against, an
//! in-memory implementation for tests, and a SurrealDB backend.
//!
//! ## Key Components
//!
//! - `storage_traits`: provider traits (roster, results, judge pool) and
//!   engine-owned stores (draws, allocations, role claims)
//! - `MemoryStore`: shared-state fake with snapshot-isolated transactions
//! - `SurrealHandle`: connection setup, schema migrations and the SurrealDB
//!   implementation of every trait
//! - `ParticipantRecord::slot_key`: the storage-level key that keeps two
//!   users off the same main speaking role

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
mod surreal_reservation;
mod surreal_store;

pub use error::{StateError, StorageError};
pub use fakes::MemoryStore;
pub use handle::{CloudConfig, SurrealHandle};
pub use migrations::init_schema;
pub use schema::{
    ClaimStatus, DebateId, DebateRecord, DebateResult, JudgeAssignment, JudgeId, JudgeRecord,
    ParticipantRecord, ParticipantRole, RoundId, RoundRecord, RoundStatus, SessionId, Side,
    TeamId, TeamRecord, TournamentId, UserId, MAX_DEBATERS_PER_TEAM,
};
pub use storage_traits::{
    AllocationStore, DrawStore, JudgePoolProvider, ReservationRepository, ReservationTx,
    ResultsProvider, RosterProvider, StorageResult,
};

/// Result type for tabroom-state connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
