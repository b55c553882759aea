//! The director resource lifecycle.
//!
//! Ops Manager has exactly one director per target, so the resource ID is
//! the target hostname. Creating and updating are the same operation: stage
//! the desired properties, apply changes and read the result back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ApplySettings;
use crate::error::{ReconcileError, Result};

use super::client::OpsManClient;
use super::types::{ApplyChangesRequest, Installation};
use super::waiter::InstallationWaiter;

/// The director resource on one Ops Manager target.
#[derive(Debug, Clone)]
pub struct DirectorResource {
    /// Ops Manager API client.
    client: OpsManClient,
    /// Apply changes behaviour.
    apply: ApplySettings,
}

/// Observed director state, as read back from Ops Manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectorSnapshot {
    /// Resource ID (the target hostname).
    pub id: String,
    /// Staged director properties as returned by the API.
    pub config: String,
    /// Installation triggered by the operation that produced this snapshot.
    #[serde(default)]
    pub installation: Option<Installation>,
    /// When the properties were read.
    pub observed_at: DateTime<Utc>,
}

impl DirectorResource {
    /// Creates a director resource bound to a client.
    #[must_use]
    pub const fn new(client: OpsManClient, apply: ApplySettings) -> Self {
        Self { client, apply }
    }

    /// Returns the resource ID.
    #[must_use]
    pub fn id(&self) -> &str {
        self.client.target()
    }

    /// Creates the director. Identical to [`Self::update`].
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the update fails.
    pub async fn create(&self, document: &str) -> Result<DirectorSnapshot> {
        info!("Creating director on {}", self.id());
        self.update(document).await
    }

    /// Stages the desired properties, applies changes and reads back.
    ///
    /// When waiting is disabled the snapshot is read while the installation
    /// may still be running.
    ///
    /// # Errors
    ///
    /// Returns an error if staging, applying, waiting or reading fails.
    pub async fn update(&self, document: &str) -> Result<DirectorSnapshot> {
        self.push_properties(document).await?;
        let installation_id = self.apply_changes().await?;

        let installation = if self.apply.wait {
            self.wait_for_installation(installation_id).await?
        } else {
            debug!("Not waiting for installation {installation_id}");
            Installation::started(installation_id)
        };

        let mut snapshot = self.read().await?;
        snapshot.installation = Some(installation);
        Ok(snapshot)
    }

    /// Reads the staged director properties.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is empty.
    pub async fn read(&self) -> Result<DirectorSnapshot> {
        debug!("Reading director properties from {}", self.id());
        let config = self.client.get_staged_director_properties().await?;

        Ok(DirectorSnapshot {
            id: self.id().to_string(),
            config,
            installation: None,
            observed_at: Utc::now(),
        })
    }

    /// Deletes the director.
    ///
    /// Ops Manager cannot remove its director, so nothing is sent.
    pub fn delete(&self, force_delete: bool) {
        warn!(
            "The director on {} cannot be deleted through the API; only local state is removed (force_delete={force_delete})",
            self.id()
        );
    }

    /// Adopts the existing director by ID.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::ImportMismatch`] if the ID is not the
    /// configured target, or an error if the read fails.
    pub async fn import(&self, id: &str) -> Result<DirectorSnapshot> {
        if id != self.id() {
            return Err(ReconcileError::ImportMismatch {
                id: id.to_string(),
                target: self.id().to_string(),
            }
            .into());
        }

        info!("Importing director {id}");
        self.read().await
    }

    /// Stages the desired director properties.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn push_properties(&self, document: &str) -> Result<()> {
        info!("Staging director properties on {}", self.id());
        self.client.put_staged_director_properties(document).await
    }

    /// Starts an apply changes run for the director only.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn apply_changes(&self) -> Result<u64> {
        let installation_id = self
            .client
            .apply_changes(&ApplyChangesRequest::director_only())
            .await?;
        info!("Started installation {installation_id} on {}", self.id());
        Ok(installation_id)
    }

    /// Waits for an installation using the configured intervals.
    ///
    /// # Errors
    ///
    /// Returns an error if the installation fails or times out.
    pub async fn wait_for_installation(&self, installation_id: u64) -> Result<Installation> {
        InstallationWaiter::from_settings(&self.apply)
            .wait(&self.client, installation_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::error::{ApiError, OpsmanError};
    use crate::opsman::types::InstallationStatus;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCUMENT: &str = r#"{"iaas_configuration":{"project":"p"}}"#;
    const PROPERTIES: &str = "/api/v0/staged/director/properties";

    fn resource(server: &MockServer, wait: bool) -> DirectorResource {
        let client = OpsManClient::new(&ProviderConfig::with_token("opsman.example.com", "t"))
            .unwrap()
            .with_base_url(server.uri());
        DirectorResource::new(
            client,
            ApplySettings {
                wait,
                poll_interval_secs: 1,
                timeout_secs: 30,
            },
        )
    }

    async fn mount_happy_path(server: &MockServer, status: &str) {
        Mock::given(method("PUT"))
            .and(path(PROPERTIES))
            .and(body_string(DOCUMENT))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/installations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "install": { "id": 9 } })),
            )
            .expect(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v0/installations/9"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": status })),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(PROPERTIES))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOCUMENT))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_update_pushes_applies_waits_and_reads() {
        let server = MockServer::start().await;
        mount_happy_path(&server, "succeeded").await;

        let snapshot = resource(&server, true).update(DOCUMENT).await.unwrap();
        assert_eq!(snapshot.id, "opsman.example.com");
        assert_eq!(snapshot.config, DOCUMENT);

        let installation = snapshot.installation.unwrap();
        assert_eq!(installation.id, 9);
        assert_eq!(installation.status, InstallationStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_create_behaves_like_update() {
        let server = MockServer::start().await;
        mount_happy_path(&server, "succeeded").await;

        let snapshot = resource(&server, true).create(DOCUMENT).await.unwrap();
        assert_eq!(snapshot.config, DOCUMENT);
    }

    #[tokio::test]
    async fn test_update_without_wait_does_not_poll() {
        let server = MockServer::start().await;
        mount_happy_path(&server, "failed").await;

        let snapshot = resource(&server, false).update(DOCUMENT).await.unwrap();
        let installation = snapshot.installation.unwrap();
        assert_eq!(installation.status, InstallationStatus::Running);
    }

    #[tokio::test]
    async fn test_update_fails_when_installation_fails() {
        let server = MockServer::start().await;
        mount_happy_path(&server, "failed").await;

        let err = resource(&server, true).update(DOCUMENT).await.unwrap_err();
        assert!(matches!(
            err,
            OpsmanError::Api(ApiError::InstallationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_import_requires_matching_id() {
        let server = MockServer::start().await;
        let err = resource(&server, true)
            .import("other.example.com")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpsmanError::Reconcile(ReconcileError::ImportMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_import_reads_director() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PROPERTIES))
            .respond_with(ResponseTemplate::new(200).set_body_string(DOCUMENT))
            .mount(&server)
            .await;

        let snapshot = resource(&server, true)
            .import("opsman.example.com")
            .await
            .unwrap();
        assert_eq!(snapshot.id, "opsman.example.com");
        assert!(snapshot.installation.is_none());
    }

    #[tokio::test]
    async fn test_delete_sends_nothing() {
        let server = MockServer::start().await;
        resource(&server, true).delete(true);
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
