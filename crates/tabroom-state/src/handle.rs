//! SurrealDB Handle - Connection and roster import
//!
//! Manages the connection and provides:
//! - in-memory, cloud (WebSocket) and local file-backed setup
//! - roster import for the CLI (`save_team`, `save_result`, `save_judge`)
//!
//! The storage trait implementations live in `surreal_store` and
//! `surreal_reservation`.

use crate::error::{classify_backend_message, StateError, StorageError};
use crate::migrations;
use crate::schema::{DebateResult, JudgeId, JudgeRecord, TeamId, TeamRecord, TournamentId, UserId};
use crate::storage_traits::StorageResult;
use crate::Result;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

const DEFAULT_NAMESPACE: &str = "tabroom";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".tabroom/db";

/// Configuration for SurrealDB Cloud connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "tabroom")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "tabroom")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`CloudConfig::from_env`], reading through `lookup`.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, String> {
        let required = |key: &str| lookup(key).ok_or_else(|| format!("{key} not set"));
        let endpoint = required("SURREALDB_ENDPOINT")?;
        let username = required("SURREALDB_USERNAME")?;
        let password = required("SURREALDB_PASSWORD")?;
        let namespace =
            lookup("SURREALDB_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let database =
            lookup("SURREALDB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let is_root = lookup("SURREALDB_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// SurrealDB connection handle for Tabroom
#[derive(Clone)]
pub struct SurrealHandle {
    pub(crate) db: Surreal<Any>,
}

/// Judge row as stored: the roster collaborator keeps feedback and judging
/// history next to the judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DbJudge {
    pub judge_id: JudgeId,
    pub user_id: UserId,
    pub tournament_id: TournamentId,
    pub name: String,
    #[serde(default)]
    pub feedback_count: u32,
    #[serde(default)]
    pub judged_teams: Vec<TeamId>,
}

impl DbJudge {
    pub(crate) fn into_record(self) -> JudgeRecord {
        JudgeRecord {
            judge_id: self.judge_id,
            user_id: self.user_id,
            tournament_id: self.tournament_id,
            name: self.name,
        }
    }
}

impl SurrealHandle {
    async fn connect(url: &str, namespace: &str, database: &str) -> Result<Surreal<Any>> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;
        db.use_ns(namespace)
            .use_db(database)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        Ok(db)
    }

    async fn from_db(db: Surreal<Any>) -> Result<Self> {
        migrations::init_schema(&db).await?;
        Ok(SurrealHandle { db })
    }

    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        let db = Self::connect("mem://", DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
        let handle = Self::from_db(db).await?;
        info!("SurrealDB connected and schema initialized");
        Ok(handle)
    }

    /// Connect to SurrealDB Cloud
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn setup_cloud(config: CloudConfig) -> Result<Self> {
        info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        let handle = Self::from_db(db).await?;
        info!("SurrealDB Cloud connected and schema initialized");
        Ok(handle)
    }

    /// Connect using environment variables
    ///
    /// If SURREALDB_ENDPOINT is set, connects to cloud.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to local persistence in `.tabroom/db`.
    #[instrument(skip_all)]
    pub async fn setup_from_env() -> Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            info!("Cloud config found, connecting to SurrealDB Cloud");
            return Self::setup_cloud(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            let db = Self::connect(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
            return Self::from_db(db).await;
        }

        std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                LOCAL_DB_PATH, e
            ))
        })?;
        let url = format!("surrealkv://{}", LOCAL_DB_PATH);
        info!("No cloud config or SURREALDB_URL found, using local persistence: {}", url);
        let db = Self::connect(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await?;
        Self::from_db(db).await
    }

    // ========== Roster import ==========

    /// Insert or replace a team by `team_id`
    #[instrument(skip(self, team), fields(team_id = %team.team_id))]
    pub async fn save_team(&self, team: &TeamRecord) -> StorageResult<()> {
        debug!("Saving team");
        let response = self
            .db
            .query("BEGIN TRANSACTION; DELETE teams WHERE team_id = $id; CREATE teams CONTENT $team; COMMIT TRANSACTION;")
            .bind(("id", team.team_id.to_string()))
            .bind(("team", team.clone()))
            .await?;
        check_response(response)?;
        Ok(())
    }

    /// Insert or replace a result by `debate_id`
    #[instrument(skip(self, result), fields(debate_id = %result.debate_id))]
    pub async fn save_result(&self, result: &DebateResult) -> StorageResult<()> {
        debug!("Saving result");
        let response = self
            .db
            .query("BEGIN TRANSACTION; DELETE results WHERE debate_id = $id; CREATE results CONTENT $result; COMMIT TRANSACTION;")
            .bind(("id", result.debate_id.to_string()))
            .bind(("result", result.clone()))
            .await?;
        check_response(response)?;
        Ok(())
    }

    /// Insert or replace a judge with its feedback count and judging history
    #[instrument(skip(self, judge, judged_teams), fields(judge_id = %judge.judge_id))]
    pub async fn save_judge(
        &self,
        judge: &JudgeRecord,
        feedback_count: u32,
        judged_teams: Vec<TeamId>,
    ) -> StorageResult<()> {
        debug!("Saving judge");
        let row = DbJudge {
            judge_id: judge.judge_id.clone(),
            user_id: judge.user_id.clone(),
            tournament_id: judge.tournament_id.clone(),
            name: judge.name.clone(),
            feedback_count,
            judged_teams,
        };
        let response = self
            .db
            .query("BEGIN TRANSACTION; DELETE judges WHERE judge_id = $id; CREATE judges CONTENT $judge; COMMIT TRANSACTION;")
            .bind(("id", judge.judge_id.to_string()))
            .bind(("judge", row))
            .await?;
        check_response(response)?;
        Ok(())
    }
}

/// Surface the root cause of a failed multi-statement query.
///
/// When a transaction fails SurrealDB marks every other statement as "not
/// executed", so the interesting message is the one that is not.
pub(crate) fn check_response(mut response: surrealdb::Response) -> StorageResult<surrealdb::Response> {
    let errors = response.take_errors();
    if errors.is_empty() {
        return Ok(response);
    }
    let mut messages: Vec<(usize, String)> = errors
        .into_iter()
        .map(|(idx, err)| (idx, err.to_string()))
        .collect();
    messages.sort_by_key(|(idx, _)| *idx);
    let cause = messages
        .iter()
        .find(|(_, msg)| !msg.contains("not executed"))
        .or_else(|| messages.first())
        .map(|(_, msg)| msg.clone())
        .unwrap_or_default();
    Err(classify_backend_message(cause))
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_config_needs_credentials() {
        let err = CloudConfig::from_lookup(|key| {
            (key == "SURREALDB_ENDPOINT").then(|| "wss://db.example".to_string())
        })
        .unwrap_err();
        assert_eq!(err, "SURREALDB_USERNAME not set");
    }

    #[test]
    fn cloud_config_defaults_namespace_and_database() {
        let config = CloudConfig::from_lookup(|key| match key {
            "SURREALDB_ENDPOINT" => Some("wss://db.example".to_string()),
            "SURREALDB_USERNAME" => Some("tab".to_string()),
            "SURREALDB_PASSWORD" => Some("secret".to_string()),
            "SURREALDB_ROOT" => Some("TRUE".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.namespace, "tabroom");
        assert_eq!(config.database, "main");
        assert!(config.is_root);
    }
}
