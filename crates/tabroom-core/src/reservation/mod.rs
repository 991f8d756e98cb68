//! Role reservation at join time.
//!
//! A participant joining a debate claims one or more roles. The whole
//! read-check-write sequence runs inside one storage transaction:
//!
//! 1. a judge already holding a claim gets it back (idempotent reconnect)
//! 2. judges may only claim JUDGE; debaters may not claim it
//! 3. a debater's previous claims in the debate are dropped first
//! 4. at most 3 distinct debaters per team per debate
//! 5. one holder per main speaking role per team
//! 6. the debate's shared session is created on first join
//! 7. one `RESERVED` row per role
//! 8. commit; a lost race comes back as a retryable `Conflict`
//!
//! The storage layer's unique slot index is the final guard for step 5 when
//! two transactions race.

pub mod error;
pub mod protocol;
pub mod roles;

pub use error::{ReservationError, ReservationErrorKind};
pub use protocol::{Reservation, RoleReservation};
pub use roles::{RoleRequest, RoleRequestError};
