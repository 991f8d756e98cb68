//! Tabroom - debate tournament CLI
//!
//! The `tabroom` command drives a tournament stored in SurrealDB.
//!
//! ## Commands
//!
//! - `import`: Load teams, judges and results from a JSON fixture
//! - `draw`: Generate (or regenerate) a round's draw
//! - `publish`: Lock a round's draw
//! - `allocate`: Seat judges on a round's debates
//! - `reserve` / `release`: Claim or drop debate roles for a user
//! - `roster`: Show a debate's current claims
//! - `standings`: Show the wins table

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tabroom_core::{
    AllocationConfig, AllocationWeights, DebateId, RoundId, TournamentId, TournamentService,
    UserId,
};
use tabroom_state::{DebateResult, JudgeRecord, SurrealHandle, TeamId, TeamRecord};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "tabroom")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Debate tournament draws, judge allocation and role reservation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import teams, judges and results from a JSON fixture
    Import {
        /// Path to fixture file
        fixture: PathBuf,
    },

    /// Generate the draw for a round (redraws a draft round in place)
    Draw {
        #[arg(short, long)]
        tournament: String,

        /// Round number, starting at 1
        #[arg(short, long)]
        round: u32,

        /// Seed for reproducible shuffles and side tie-breaks
        #[arg(long, env = "TABROOM_DRAW_SEED")]
        seed: Option<u64>,
    },

    /// Publish a round, locking its draw
    Publish {
        /// Round ID
        #[arg(short, long)]
        round: String,
    },

    /// Allocate judges to every debate in a round
    Allocate {
        /// Round ID
        #[arg(short, long)]
        round: String,

        /// Cost per point of strength shortfall
        /// [default: TABROOM_STRENGTH_MISMATCH_WEIGHT or 10]
        #[arg(long)]
        strength_weight: Option<f64>,

        /// Cost of seating a judge who has seen one of the teams
        /// [default: TABROOM_CONFLICT_PENALTY or 1000]
        #[arg(long)]
        conflict_penalty: Option<f64>,

        /// Judges per debate
        #[arg(long, default_value = "1")]
        panel: usize,
    },

    /// Reserve roles for a user in a debate
    Reserve {
        #[arg(short, long)]
        debate: String,

        #[arg(short, long)]
        user: String,

        /// Roles to claim, e.g. FIRST_SPEAKER REPLY_SPEAKER
        #[arg(required = true)]
        roles: Vec<String>,
    },

    /// Release a debater's roles in a debate
    Release {
        #[arg(short, long)]
        debate: String,

        #[arg(short, long)]
        user: String,
    },

    /// Show the current claims in a debate
    Roster {
        #[arg(short, long)]
        debate: String,
    },

    /// Show the standings table
    Standings {
        #[arg(short, long)]
        tournament: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tabroom_core::init_tracing(cli.json, level);

    let handle = SurrealHandle::setup_from_env()
        .await
        .context("Failed to connect to tournament database")?;

    let result = run(cli.command, handle, cli.json).await;
    tabroom_core::METRICS.flush();
    result
}

async fn run(command: Commands, handle: SurrealHandle, json: bool) -> Result<()> {
    match command {
        Commands::Import { fixture } => cmd_import(&handle, &fixture).await,
        Commands::Draw {
            tournament,
            round,
            seed,
        } => cmd_draw(handle, &tournament, round, seed, json).await,
        Commands::Publish { round } => {
            let service = TournamentService::new(handle);
            service
                .publish_round(&RoundId::from(round.as_str()))
                .await
                .with_context(|| format!("Failed to publish round {round}"))?;
            println!("Published round {round}");
            Ok(())
        }
        Commands::Allocate {
            round,
            strength_weight,
            conflict_penalty,
            panel,
        } => {
            let weights =
                AllocationWeights::from_env().with_overrides(strength_weight, conflict_penalty);
            cmd_allocate(handle, &round, weights, panel, json).await
        }
        Commands::Reserve {
            debate,
            user,
            roles,
        } => cmd_reserve(handle, &debate, &user, &roles, json).await,
        Commands::Release { debate, user } => {
            let service = TournamentService::new(handle);
            let released = service
                .release_roles(&DebateId::from(debate.as_str()), &UserId::from(user.as_str()))
                .await
                .context("Failed to release roles")?;
            println!("Released {released} claim(s) for {user} in {debate}");
            Ok(())
        }
        Commands::Roster { debate } => cmd_roster(handle, &debate, json).await,
        Commands::Standings { tournament } => cmd_standings(handle, &tournament, json).await,
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A roster snapshot to seed a tournament with.
#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    teams: Vec<TeamRecord>,
    #[serde(default)]
    judges: Vec<FixtureJudge>,
    #[serde(default)]
    results: Vec<DebateResult>,
}

#[derive(Debug, Deserialize)]
struct FixtureJudge {
    #[serde(flatten)]
    judge: JudgeRecord,
    #[serde(default)]
    feedback_count: u32,
    /// Teams this judge has already adjudicated
    #[serde(default)]
    judged_teams: Vec<TeamId>,
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse fixture {}", path.display()))?;
    validate_fixture(&fixture)?;
    Ok(fixture)
}

fn validate_fixture(fixture: &Fixture) -> Result<()> {
    let mut teams = HashSet::new();
    for team in &fixture.teams {
        if !teams.insert(&team.team_id) {
            bail!("Duplicate team id {}", team.team_id);
        }
    }
    for result in &fixture.results {
        for side in [&result.proposition, &result.opposition] {
            if !teams.contains(side) {
                bail!(
                    "Result for debate {} references unknown team {}",
                    result.debate_id,
                    side
                );
            }
        }
        if result.proposition == result.opposition {
            bail!("Result for debate {} pits a team against itself", result.debate_id);
        }
    }
    let mut judges = HashSet::new();
    for entry in &fixture.judges {
        if !judges.insert(&entry.judge.judge_id) {
            bail!("Duplicate judge id {}", entry.judge.judge_id);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_import(handle: &SurrealHandle, path: &Path) -> Result<()> {
    let fixture = load_fixture(path)?;

    for team in &fixture.teams {
        handle
            .save_team(team)
            .await
            .with_context(|| format!("Failed to import team {}", team.team_id))?;
    }
    for entry in &fixture.judges {
        handle
            .save_judge(&entry.judge, entry.feedback_count, entry.judged_teams.clone())
            .await
            .with_context(|| format!("Failed to import judge {}", entry.judge.judge_id))?;
    }
    for result in &fixture.results {
        handle
            .save_result(result)
            .await
            .with_context(|| format!("Failed to import result {}", result.debate_id))?;
    }

    info!(
        teams = fixture.teams.len(),
        judges = fixture.judges.len(),
        results = fixture.results.len(),
        "Fixture imported"
    );
    println!(
        "Imported {} team(s), {} judge(s), {} result(s)",
        fixture.teams.len(),
        fixture.judges.len(),
        fixture.results.len()
    );
    Ok(())
}

async fn cmd_draw(
    handle: SurrealHandle,
    tournament: &str,
    round: u32,
    seed: Option<u64>,
    json: bool,
) -> Result<()> {
    let service = match seed {
        Some(seed) => TournamentService::with_seed(handle, seed),
        None => TournamentService::new(handle),
    };
    let outcome = service
        .generate_round_draw(&TournamentId::from(tournament), round)
        .await
        .with_context(|| format!("Failed to draw round {round} of {tournament}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("Round {} ({})", outcome.round_number, outcome.round_id);
    for debate in &outcome.pairings {
        println!(
            "  {}  {} vs {}  importance {}",
            debate.debate_id,
            debate.proposition,
            debate.opposition,
            debate
                .importance
                .map(|i| format!("{i:.1}"))
                .unwrap_or_else(|| "-".to_string())
        );
    }
    for team in &outcome.unpaired {
        println!("  unpaired: {team}");
    }
    Ok(())
}

async fn cmd_allocate(
    handle: SurrealHandle,
    round: &str,
    weights: AllocationWeights,
    panel: usize,
    json: bool,
) -> Result<()> {
    if panel == 0 {
        bail!("Panel size must be at least 1");
    }
    let service = TournamentService::new(handle).with_allocation_config(AllocationConfig {
        weights,
        panel_size: panel,
    });
    let outcome = service
        .auto_allocate_judges(&RoundId::from(round), None)
        .await
        .with_context(|| format!("Failed to allocate judges for round {round}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    for assignment in &outcome.assignments {
        println!("  {}  judge {}", assignment.debate_id, assignment.judge_id);
    }
    for debate in &outcome.unallocated {
        println!("  {debate}  no judge available");
    }
    println!(
        "Seated {} judge(s), {} debate(s) unstaffed",
        outcome.assignments.len(),
        outcome.unallocated.len()
    );
    Ok(())
}

async fn cmd_reserve(
    handle: SurrealHandle,
    debate: &str,
    user: &str,
    roles: &[String],
    json: bool,
) -> Result<()> {
    let service = TournamentService::new(handle);
    let reservation = match service
        .reserve_roles(&DebateId::from(debate), &UserId::from(user), roles)
        .await
    {
        Ok(r) => r,
        Err(err) if err.is_retryable() => {
            bail!("{err} (retry, possibly with different roles)")
        }
        Err(err) => {
            let kind = err.kind();
            return Err(err).context(format!("Reservation failed ({kind})"));
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&reservation)?);
        return Ok(());
    }

    let roles: Vec<String> = reservation.roles().iter().map(|r| r.to_string()).collect();
    let verb = if reservation.reconnected {
        "Reconnected"
    } else {
        "Reserved"
    };
    println!(
        "{verb} {} for {} in {} (session {})",
        roles.join(", "),
        reservation.user_id,
        reservation.debate_id,
        reservation.session_id
    );
    Ok(())
}

async fn cmd_roster(handle: SurrealHandle, debate: &str, json: bool) -> Result<()> {
    let service = TournamentService::new(handle);
    let claims = service
        .debate_roster(&DebateId::from(debate))
        .await
        .with_context(|| format!("Failed to load roster for {debate}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&claims)?);
        return Ok(());
    }

    if claims.is_empty() {
        println!("No roles claimed in {debate}");
        return Ok(());
    }
    for claim in &claims {
        let team = claim
            .team_id
            .as_ref()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<16} {:<14} {}", claim.role.as_str(), team, claim.user_id);
    }
    Ok(())
}

async fn cmd_standings(handle: SurrealHandle, tournament: &str, json: bool) -> Result<()> {
    let service = TournamentService::new(handle);
    let table = service
        .standings(&TournamentId::from(tournament))
        .await
        .with_context(|| format!("Failed to compute standings for {tournament}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    println!("{:<4} {:<20} {:>4} {:>4} {:>4}", "#", "team", "wins", "prop", "opp");
    for (rank, row) in table.iter().enumerate() {
        println!(
            "{:<4} {:<20} {:>4} {:>4} {:>4}",
            rank + 1,
            row.team_id.to_string(),
            row.wins,
            row.prop_count,
            row.opp_count
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const FIXTURE: &str = r#"{
        "teams": [
            {"team_id": "t1", "tournament_id": "open", "name": "Alpha", "members": ["u1", "u2"]},
            {"team_id": "t2", "tournament_id": "open", "name": "Beta"}
        ],
        "judges": [
            {"judge_id": "j1", "user_id": "u9", "tournament_id": "open", "name": "Jo",
             "feedback_count": 12, "judged_teams": ["t1"]},
            {"judge_id": "j2", "user_id": "u8", "tournament_id": "open", "name": "Sam"}
        ],
        "results": [
            {"debate_id": "d1", "tournament_id": "open", "proposition": "t1",
             "opposition": "t2", "winner": "opposition", "confirmed": true}
        ]
    }"#;

    #[test]
    fn test_fixture_parses_with_defaults() {
        let file = write_fixture(FIXTURE);
        let fixture = load_fixture(file.path()).unwrap();

        assert_eq!(fixture.teams.len(), 2);
        assert!(fixture.teams[1].members.is_empty());
        assert_eq!(fixture.judges[0].feedback_count, 12);
        assert_eq!(fixture.judges[0].judged_teams, vec![TeamId::from("t1")]);
        assert_eq!(fixture.judges[1].feedback_count, 0);
        assert_eq!(fixture.judges[1].judge.name, "Sam");
        assert_eq!(fixture.results[0].winning_team(), &TeamId::from("t2"));
    }

    #[test]
    fn test_empty_fixture_is_valid() {
        let file = write_fixture("{}");
        let fixture = load_fixture(file.path()).unwrap();
        assert!(fixture.teams.is_empty());
    }

    #[test]
    fn test_fixture_rejects_unknown_team_in_result() {
        let file = write_fixture(
            r#"{
                "teams": [{"team_id": "t1", "tournament_id": "open", "name": "Alpha"}],
                "results": [{"debate_id": "d1", "tournament_id": "open", "proposition": "t1",
                             "opposition": "ghost", "winner": "proposition", "confirmed": true}]
            }"#,
        );
        let err = load_fixture(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("unknown team ghost"));
    }

    #[test]
    fn test_fixture_rejects_duplicate_team() {
        let file = write_fixture(
            r#"{"teams": [
                {"team_id": "t1", "tournament_id": "open", "name": "Alpha"},
                {"team_id": "t1", "tournament_id": "open", "name": "Again"}
            ]}"#,
        );
        let err = load_fixture(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Duplicate team id t1"));
    }

    #[test]
    fn test_malformed_fixture_reports_path() {
        let file = write_fixture("{ not json");
        let err = load_fixture(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse fixture"));
    }

    #[test]
    fn test_allocate_flags_are_optional_overrides() {
        let cli = Cli::try_parse_from(["tabroom", "allocate", "--round", "r1", "--strength-weight", "4"])
            .unwrap();
        match cli.command {
            Commands::Allocate {
                strength_weight,
                conflict_penalty,
                panel,
                ..
            } => {
                assert_eq!(strength_weight, Some(4.0));
                assert_eq!(conflict_penalty, None);
                assert_eq!(panel, 1);
                let weights = AllocationWeights::from_lookup(|_| None)
                    .with_overrides(strength_weight, conflict_penalty);
                assert_eq!(weights.strength_mismatch_weight, 4.0);
                assert_eq!(weights.conflict_penalty, 1000.0);
            }
            _ => panic!("expected allocate"),
        }
    }

    #[test]
    fn test_cli_parses_reserve_roles() {
        let cli = Cli::try_parse_from([
            "tabroom",
            "--json",
            "reserve",
            "--debate",
            "d1",
            "--user",
            "u1",
            "FIRST_SPEAKER",
            "REPLY_SPEAKER",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Reserve { roles, .. } => {
                assert_eq!(roles, vec!["FIRST_SPEAKER", "REPLY_SPEAKER"]);
            }
            _ => panic!("expected reserve"),
        }
    }

    #[tokio::test]
    async fn test_import_then_standings_in_memory() {
        let file = write_fixture(FIXTURE);
        let handle = SurrealHandle::setup_db().await.unwrap();
        cmd_import(&handle, file.path()).await.unwrap();

        let service = TournamentService::new(handle);
        let table = service.standings(&TournamentId::from("open")).await.unwrap();
        assert_eq!(table[0].team_id, TeamId::from("t2"));
        assert_eq!(table[0].wins, 1);
    }
}
