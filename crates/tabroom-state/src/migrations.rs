//! SurrealDB schema migrations and initialization
//!
//! Sets up every Tabroom table with its indexes. The participant slot index
//! is the storage-level guard against two users holding the same main
//! speaking role on the same team in the same debate.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Tabroom tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Tabroom SurrealDB schema");

    init_roster_tables(db).await?;
    init_draw_tables(db).await?;
    init_participants_table(db).await?;

    info!("Tabroom schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, sql: &str) -> Result<()> {
    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Roster collaborator tables: `teams`, `results`, `judges`.
///
/// ```text
/// TABLE teams   { team_id (unique), tournament_id, name, members[] }
/// TABLE results { debate_id, tournament_id, proposition, opposition, winner, confirmed }
/// TABLE judges  { judge_id (unique), user_id, tournament_id, name,
///                 feedback_count, judged_teams[] }
/// ```
async fn init_roster_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing roster tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS teams SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_team_id ON TABLE teams COLUMNS team_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_team_tournament ON TABLE teams COLUMNS tournament_id;

        DEFINE TABLE IF NOT EXISTS results SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_result_tournament ON TABLE results COLUMNS tournament_id, confirmed;

        DEFINE TABLE IF NOT EXISTS judges SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_judge_id ON TABLE judges COLUMNS judge_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_judge_tournament ON TABLE judges COLUMNS tournament_id;
    "#;

    run(db, sql).await?;
    info!("✓ roster tables initialized");
    Ok(())
}

/// Draw output tables: `rounds`, `debates`, `judge_assignments`.
///
/// Constraints:
/// - `(tournament_id, round_number)` is unique
/// - `debate_id` is unique
/// - `(debate_id, judge_id)` is unique
async fn init_draw_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing draw tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS rounds SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_round_id ON TABLE rounds COLUMNS round_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_round_number ON TABLE rounds COLUMNS tournament_id, round_number UNIQUE;

        DEFINE TABLE IF NOT EXISTS debates SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_debate_id ON TABLE debates COLUMNS debate_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_debate_round ON TABLE debates COLUMNS round_id;

        DEFINE TABLE IF NOT EXISTS judge_assignments SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_assignment_seat ON TABLE judge_assignments COLUMNS debate_id, judge_id UNIQUE;
    "#;

    run(db, sql).await?;
    info!("✓ draw tables initialized");
    Ok(())
}

/// Role claims: `participants`.
///
/// ```text
/// TABLE participants {
///   debate_id, user_id, team_id?, role, status, session_id,
///   slot_key (unique), reserved_at
/// }
/// ```
async fn init_participants_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing participants table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS participants SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_participant_slot ON TABLE participants COLUMNS slot_key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_participant_debate ON TABLE participants COLUMNS debate_id, team_id;
    "#;

    run(db, sql).await?;
    info!("✓ participants table initialized");
    Ok(())
}
