//! Reconciler for maintaining the desired director configuration.
//!
//! This module implements the reconciliation loop that compares the desired
//! document with recorded state and the director observed on Ops Manager,
//! and takes corrective action to converge them.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::OpsmanConfig;
use crate::error::{OpsmanError, Result, StateError};
use crate::opsman::{DirectorResource, Installation};
use crate::planner::{ChangePlan, DiffDetail, DiffEngine, DiffType};
use crate::state::{DirectorState, HistoryEntry, Operation, StateStore, generate_holder_id};

/// Default number of reconciliation attempts.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay between attempts when the error suggests none.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Reconciler for the director resource.
pub struct Reconciler<'a, S: StateStore> {
    /// Configuration.
    config: &'a OpsmanConfig,
    /// State store.
    state_store: &'a S,
    /// Director resource.
    director: &'a DirectorResource,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Maximum reconciliation attempts.
    max_attempts: u32,
    /// Fixed delay between attempts, overriding the error's suggestion.
    retry_delay: Option<Duration>,
}

/// Result of a reconciliation run.
#[derive(Debug, serde::Serialize)]
pub struct ReconciliationResult {
    /// Whether reconciliation succeeded.
    pub success: bool,
    /// Resource ID (the target hostname).
    pub resource_id: String,
    /// What the last attempt found.
    pub diff_type: String,
    /// Number of actions executed in the last attempt.
    pub actions_executed: usize,
    /// Whether the last attempt triggered apply changes.
    pub changes_applied: bool,
    /// Attempts made.
    pub attempts: u32,
    /// Installation started by the last attempt, if any.
    pub installation: Option<Installation>,
    /// Errors encountered.
    pub errors: Vec<String>,
    /// Final state after reconciliation.
    #[serde(skip)]
    pub final_state: Option<DirectorState>,
}

/// Report of drift detection.
#[derive(Debug, serde::Serialize)]
pub struct DriftReport {
    /// Resource ID (the target hostname).
    pub resource_id: String,
    /// Whether any change is pending.
    pub has_drift: bool,
    /// Classification of the change.
    pub diff_type: String,
    /// Whether state has been recorded for the director.
    pub has_state: bool,
    /// Property-level differences.
    pub details: Vec<DriftDetail>,
}

/// One drifted property.
#[derive(Debug, serde::Serialize)]
pub struct DriftDetail {
    /// Dotted property path.
    pub path: String,
    /// Current value.
    pub current: Option<String>,
    /// Expected value.
    pub expected: Option<String>,
}

impl<'a, S: StateStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(
        config: &'a OpsmanConfig,
        state_store: &'a S,
        director: &'a DirectorResource,
    ) -> Self {
        Self {
            config,
            state_store,
            director,
            diff_engine: DiffEngine::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: None,
        }
    }

    /// Sets the maximum reconciliation attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets a fixed delay between attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = Some(retry_delay);
        self
    }

    /// Computes the plan that [`Self::reconcile`] would execute.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded, belongs to another
    /// target, or the director cannot be read.
    pub async fn plan(&self) -> Result<ChangePlan> {
        let state = self.load_state().await?;
        let observed = self.director.read().await?;
        let diff = self
            .diff_engine
            .compute_diff(self.config, state.as_ref(), Some(&observed))?;
        Ok(ChangePlan::from_diff(&diff, self.config))
    }

    /// Performs a full reconciliation under the state lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken, state cannot be loaded,
    /// or the last attempt failed before any action ran. A plan that fails
    /// part way is reported through [`ReconciliationResult::success`].
    pub async fn reconcile(&self) -> Result<ReconciliationResult> {
        self.locked("apply", self.reconcile_unlocked()).await
    }

    async fn reconcile_unlocked(&self) -> Result<ReconciliationResult> {
        let resource_id = self.director.id().to_string();
        info!("Starting reconciliation for director on {resource_id}");

        let mut state = self
            .load_state()
            .await?
            .unwrap_or_else(|| DirectorState::new(&resource_id));

        let mut last_error = None;
        let mut result = ReconciliationResult {
            success: false,
            resource_id: resource_id.clone(),
            diff_type: String::new(),
            actions_executed: 0,
            changes_applied: false,
            attempts: 0,
            installation: None,
            errors: vec![],
            final_state: None,
        };

        for attempt in 1..=self.max_attempts {
            debug!("Reconciliation attempt {attempt}/{}", self.max_attempts);
            result.attempts = attempt;

            let Err(err) = self.reconcile_once(&mut state, &mut result).await else {
                break;
            };

            error!("Reconciliation attempt {attempt} failed: {err}");
            result.errors.push(format!("Attempt {attempt}: {err}"));

            // Apply changes is never started twice in one run.
            let retry = err.is_retryable() && !result.changes_applied;
            let delay = self.delay_for(&err);
            last_error = Some(err);

            if !retry {
                break;
            }
            if attempt < self.max_attempts {
                warn!("Retrying in {}s", delay.as_secs());
                tokio::time::sleep(delay).await;
            }
        }

        if (!state.is_empty() || !state.history.is_empty())
            && let Err(e) = self.state_store.save(&state).await
        {
            error!("Failed to save state: {e}");
            result.errors.push(format!("Failed to save state: {e}"));
        }

        result.final_state = Some(state);

        if !result.success
            && result.actions_executed == 0
            && let Some(err) = last_error
        {
            return Err(err);
        }

        Ok(result)
    }

    /// Performs a single reconciliation attempt.
    async fn reconcile_once(
        &self,
        state: &mut DirectorState,
        result: &mut ReconciliationResult,
    ) -> Result<()> {
        result.actions_executed = 0;
        result.changes_applied = false;
        result.installation = None;

        let observed = self.director.read().await?;
        let recorded = (!state.is_empty()).then_some(&*state);
        let diff = self
            .diff_engine
            .compute_diff(self.config, recorded, Some(&observed))?;
        result.diff_type = diff.diff_type.to_string();

        info!("Director {}: {}", diff.resource_id, diff.diff_type);

        if !diff.has_changes() {
            if state.is_empty() {
                info!("Recording existing director configuration");
                state.record_snapshot(&observed);
                state.set_config_hash(&diff.new_hash);
                state.add_history(HistoryEntry::new(Operation::Refresh, &diff.new_hash, None));
            } else {
                info!("No changes required - director is converged");
            }
            result.success = true;
            return Ok(());
        }

        let plan = ChangePlan::from_diff(&diff, self.config);
        let execution = crate::planner::PlanExecutor::new(self.director)
            .execute(&plan, state)
            .await?;

        result.actions_executed = execution.results.len();
        result.changes_applied = execution.changes_applied();
        result.success = execution.all_successful();
        result.installation.clone_from(&execution.installation);

        match execution.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Returns the delay before retrying after `err`.
    fn delay_for(&self, err: &OpsmanError) -> Duration {
        self.retry_delay
            .or_else(|| err.retry_delay_secs().map(Duration::from_secs))
            .unwrap_or(DEFAULT_RETRY_DELAY)
    }

    /// Checks for drift without applying changes.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded or the director cannot be
    /// read.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        info!("Checking for drift on {}", self.director.id());

        let state = self.load_state().await?;
        let observed = self.director.read().await?;
        let diff = self
            .diff_engine
            .compute_diff(self.config, state.as_ref(), Some(&observed))?;

        Ok(DriftReport {
            resource_id: diff.resource_id.clone(),
            has_drift: diff.has_changes(),
            diff_type: diff.diff_type.to_string(),
            has_state: state.is_some(),
            details: diff.details.iter().map(DriftDetail::from).collect(),
        })
    }

    /// Reads the director and records it in state.
    ///
    /// # Errors
    ///
    /// Returns an error if the director cannot be read or state cannot be
    /// saved.
    pub async fn refresh(&self) -> Result<DirectorState> {
        self.locked("refresh", async {
            let mut state = self
                .load_state()
                .await?
                .unwrap_or_else(|| DirectorState::new(self.director.id()));

            let snapshot = self.director.read().await?;
            state.record_snapshot(&snapshot);
            let hash = state.config_hash.clone();
            state.add_history(HistoryEntry::new(Operation::Refresh, &hash, None));

            self.state_store.save(&state).await?;
            Ok(state)
        })
        .await
    }

    /// Adopts the existing director into state.
    ///
    /// # Errors
    ///
    /// Returns an error if the ID is not the configured target, the
    /// director cannot be read, or state cannot be saved.
    pub async fn import(&self, id: &str) -> Result<DirectorState> {
        self.locked("import", async {
            let snapshot = self.director.import(id).await?;

            let mut state = self
                .load_state()
                .await?
                .unwrap_or_else(|| DirectorState::new(self.director.id()));
            state.record_snapshot(&snapshot);
            let hash = state.config_hash.clone();
            state.add_history(HistoryEntry::new(Operation::Import, &hash, None));

            self.state_store.save(&state).await?;
            info!("Imported director {id}");
            Ok(state)
        })
        .await
    }

    /// Forgets the director. Nothing is changed on Ops Manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be deleted.
    pub async fn destroy(&self) -> Result<()> {
        let lock = self
            .state_store
            .acquire_lock(&generate_holder_id(), "destroy")
            .await?;

        self.director.delete(self.config.director.force_delete);
        let outcome = self.state_store.delete().await;

        if outcome.is_err() {
            self.state_store.release_lock(&lock.lock_id).await?;
        }
        outcome
    }

    /// Loads state and checks it belongs to the configured target.
    async fn load_state(&self) -> Result<Option<DirectorState>> {
        let state = self.state_store.load().await?;

        if let Some(state) = &state
            && state.target != self.config.provider.target_hostname
        {
            return Err(OpsmanError::State(StateError::TargetMismatch {
                recorded: state.target.clone(),
                configured: self.config.provider.target_hostname.clone(),
            }));
        }

        Ok(state)
    }

    /// Runs `operation` while holding the state lock.
    async fn locked<T>(&self, operation: &str, work: impl Future<Output = Result<T>>) -> Result<T> {
        let lock = self
            .state_store
            .acquire_lock(&generate_holder_id(), operation)
            .await?;

        let outcome = work.await;

        if let Err(e) = self.state_store.release_lock(&lock.lock_id).await {
            warn!("Failed to release state lock {}: {e}", lock.lock_id);
        }

        outcome
    }
}

impl From<&DiffDetail> for DriftDetail {
    fn from(detail: &DiffDetail) -> Self {
        Self {
            path: detail.path.clone(),
            current: detail.old_value.clone(),
            expected: detail.new_value.clone(),
        }
    }
}

impl DriftReport {
    /// Returns true if the director is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }

    /// Returns true if the change is remote drift rather than a config edit.
    #[must_use]
    pub fn is_remote_drift(&self) -> bool {
        self.diff_type == DiffType::Drift.to_string()
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected on {} ({}):", self.resource_id, self.diff_type)?;
            for detail in &self.details {
                writeln!(f, "  - {}", detail.path)?;
            }
        } else {
            write!(f, "No drift detected - director is converged")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Director: {}", self.resource_id)?;
        writeln!(f, "  Change: {}", self.diff_type)?;
        writeln!(f, "  Actions: {}", self.actions_executed)?;
        writeln!(f, "  Attempts: {}", self.attempts)?;
        if let Some(installation) = &self.installation {
            writeln!(f, "  Installation: {} ({})", installation.id, installation.status)?;
        }

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApplySettings, DirectorSpec, ProviderConfig, StateConfig};
    use crate::error::ApiError;
    use crate::opsman::{InstallationStatus, OpsManClient};
    use crate::state::LocalStateStore;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DESIRED: &str = r#"{"director_configuration":{"ntp_servers_string":"pool.ntp.org"}}"#;
    const DESIRED_PRETTY: &str = "{\n  \"director_configuration\": {\n    \"ntp_servers_string\": \"pool.ntp.org\"\n  }\n}";
    const OTHER: &str = r#"{"director_configuration":{"ntp_servers_string":"time.example.com"}}"#;
    const PROPERTIES: &str = "/api/v0/staged/director/properties";

    struct Fixture {
        config: OpsmanConfig,
        store: LocalStateStore,
        director: DirectorResource,
        _temp: TempDir,
    }

    fn fixture(server: &MockServer, document: &str) -> Fixture {
        let temp = TempDir::new().unwrap();
        let config = OpsmanConfig {
            provider: ProviderConfig::with_token("opsman.example.com", "t"),
            director: DirectorSpec::inline(document),
            apply: ApplySettings {
                wait: true,
                poll_interval_secs: 1,
                timeout_secs: 30,
            },
            state: StateConfig::default(),
        };
        let client = OpsManClient::new(&config.provider)
            .unwrap()
            .with_base_url(server.uri());
        let director = DirectorResource::new(client, config.apply);
        let store = LocalStateStore::with_base_dir(temp.path().join(".opsman"));
        Fixture {
            config,
            store,
            director,
            _temp: temp,
        }
    }

    fn reconciler(f: &Fixture) -> Reconciler<'_, LocalStateStore> {
        Reconciler::new(&f.config, &f.store, &f.director).with_retry_delay(Duration::ZERO)
    }

    async fn mount_read(server: &MockServer, body: &str) {
        Mock::given(method("GET"))
            .and(path(PROPERTIES))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    async fn mount_apply(server: &MockServer, install_status: &str) {
        Mock::given(method("PUT"))
            .and(path(PROPERTIES))
            .respond_with(ResponseTemplate::new(200))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/installations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "install": { "id": 3 } })),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v0/installations/3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "status": install_status })),
            )
            .mount(server)
            .await;
    }

    /// Serves `before` on the first read and the pushed document afterwards.
    async fn mount_staged(server: &MockServer, before: &str, after: &str) {
        Mock::given(method("GET"))
            .and(path(PROPERTIES))
            .respond_with(ResponseTemplate::new(200).set_body_string(before))
            .up_to_n_times(1)
            .mount(server)
            .await;
        mount_read(server, after).await;
    }

    #[tokio::test]
    async fn test_equivalent_director_is_recorded_without_changes() {
        let server = MockServer::start().await;
        mount_read(&server, DESIRED_PRETTY).await;
        let f = fixture(&server, DESIRED);

        let result = reconciler(&f).reconcile().await.unwrap();
        assert!(result.success);
        assert_eq!(result.actions_executed, 0);
        assert_eq!(result.diff_type, "no change");

        let state = f.store.load().await.unwrap().unwrap();
        assert_eq!(state.director_config.as_deref(), Some(DESIRED_PRETTY));
        assert!(!f.store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_changed_director_is_updated() {
        let server = MockServer::start().await;
        mount_read(&server, OTHER).await;
        mount_apply(&server, "succeeded").await;
        let f = fixture(&server, DESIRED);

        let result = reconciler(&f).reconcile().await.unwrap();
        assert!(result.success);
        assert_eq!(result.diff_type, "update");
        assert_eq!(result.actions_executed, 4);
        assert_eq!(
            result.installation.map(|i| i.status),
            Some(InstallationStatus::Succeeded)
        );
        assert!(f.store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_installation_is_reported_without_retry() {
        let server = MockServer::start().await;
        mount_staged(&server, OTHER, DESIRED).await;
        mount_apply(&server, "failed").await;
        let f = fixture(&server, DESIRED);

        let result = reconciler(&f).with_max_attempts(2).reconcile().await.unwrap();
        assert!(!result.success);
        assert!(result.changes_applied);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.diff_type, "update");
        assert_eq!(
            result.installation.map(|i| i.status),
            Some(InstallationStatus::Failed)
        );
        assert!(result.errors[0].contains("failed"));

        let state = f.store.load().await.unwrap().unwrap();
        assert_eq!(state.history.len(), 1);
        assert!(!state.history[0].success);
        assert!(state.director_config.is_none());
    }

    #[tokio::test]
    async fn test_failed_installation_with_state_applies_once() {
        let server = MockServer::start().await;
        mount_staged(&server, OTHER, DESIRED).await;
        mount_apply(&server, "cancelled").await;
        let f = fixture(&server, DESIRED);

        let mut state = DirectorState::new("opsman.example.com");
        state.director_config = Some(OTHER.to_string());
        f.store.save(&state).await.unwrap();

        let result = reconciler(&f).reconcile().await.unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts, 1);

        let state = f.store.load().await.unwrap().unwrap();
        assert_eq!(state.director_config.as_deref(), Some(OTHER));
        assert_eq!(
            state.last_installation.map(|i| i.status),
            Some(InstallationStatus::Cancelled)
        );
        assert!(!f.store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_push_is_not_retried() {
        let server = MockServer::start().await;
        mount_read(&server, OTHER).await;
        Mock::given(method("PUT"))
            .and(path(PROPERTIES))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid property"))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, DESIRED);

        let result = reconciler(&f).reconcile().await.unwrap();
        assert!(!result.success);
        assert!(!result.changes_applied);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.actions_executed, 1);
    }

    #[test]
    fn test_retry_delay_follows_error_unless_fixed() {
        let config = OpsmanConfig {
            provider: ProviderConfig::with_token("opsman.example.com", "t"),
            director: DirectorSpec::inline(DESIRED),
            apply: ApplySettings::default(),
            state: StateConfig::default(),
        };
        let client = OpsManClient::new(&config.provider).unwrap();
        let director = DirectorResource::new(client, config.apply);
        let store = LocalStateStore::with_base_dir(".opsman-unused");
        let network = OpsmanError::Api(ApiError::network("opsman.example.com", "reset"));
        let rejected = OpsmanError::Api(ApiError::api_error(422, "invalid"));

        let r = Reconciler::new(&config, &store, &director);
        assert_eq!(r.delay_for(&network), Duration::from_secs(5));
        assert_eq!(r.delay_for(&rejected), DEFAULT_RETRY_DELAY);

        let r = r.with_retry_delay(Duration::ZERO);
        assert_eq!(r.delay_for(&network), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_unreadable_director_returns_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROPERTIES))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let f = fixture(&server, DESIRED);

        let err = reconciler(&f).with_max_attempts(1).reconcile().await.unwrap_err();
        assert!(matches!(err, OpsmanError::Api(_)));
        assert!(!f.store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_check_drift_reports_remote_change() {
        let server = MockServer::start().await;
        mount_read(&server, OTHER).await;
        let f = fixture(&server, DESIRED);

        let mut state = DirectorState::new("opsman.example.com");
        state.director_config = Some(DESIRED.to_string());
        f.store.save(&state).await.unwrap();

        let report = reconciler(&f).check_drift().await.unwrap();
        assert!(report.has_drift);
        assert!(report.is_remote_drift());
        assert!(report.has_state);
        assert_eq!(report.details[0].path, "director_configuration.ntp_servers_string");

        // drift check does not touch state
        let after = f.store.load().await.unwrap().unwrap();
        assert_eq!(after, state);
    }

    #[tokio::test]
    async fn test_state_for_other_target_is_rejected() {
        let server = MockServer::start().await;
        mount_read(&server, DESIRED).await;
        let f = fixture(&server, DESIRED);
        f.store
            .save(&DirectorState::new("other.example.com"))
            .await
            .unwrap();

        let err = reconciler(&f).plan().await.unwrap_err();
        assert!(matches!(
            err,
            OpsmanError::State(StateError::TargetMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_refresh_and_import_record_history() {
        let server = MockServer::start().await;
        mount_read(&server, DESIRED).await;
        let f = fixture(&server, DESIRED);
        let r = reconciler(&f);

        let state = r.import("opsman.example.com").await.unwrap();
        assert_eq!(state.last_operation().map(|e| e.operation), Some(Operation::Import));

        let state = r.refresh().await.unwrap();
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.last_operation().map(|e| e.operation), Some(Operation::Refresh));

        assert!(r.import("other.example.com").await.is_err());
        assert!(!f.store.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_removes_state_only() {
        let server = MockServer::start().await;
        let f = fixture(&server, DESIRED);
        f.store
            .save(&DirectorState::new("opsman.example.com"))
            .await
            .unwrap();

        reconciler(&f).destroy().await.unwrap();
        assert!(!f.store.exists().await.unwrap());
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_plan_for_changed_config() {
        let server = MockServer::start().await;
        mount_read(&server, DESIRED).await;
        let f = fixture(&server, OTHER);

        let plan = reconciler(&f).plan().await.unwrap();
        assert_eq!(plan.diff_type, DiffType::Update);
        assert_eq!(plan.action_count(), 4);
    }
}
