//! Completion waiting for apply changes installations.
//!
//! Polls an installation until Ops Manager reports a terminal status or the
//! configured timeout elapses.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ApplySettings;
use crate::error::{ApiError, OpsmanError, Result};

use super::client::OpsManClient;
use super::types::{Installation, InstallationStatus};

/// Polls installations until they finish.
#[derive(Debug, Clone, Copy)]
pub struct InstallationWaiter {
    /// Delay between status checks.
    poll_interval: Duration,
    /// Upper bound on the total wait.
    timeout: Duration,
}

impl InstallationWaiter {
    /// Creates a waiter from the apply settings.
    #[must_use]
    pub const fn from_settings(settings: &ApplySettings) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Creates a waiter with explicit intervals.
    #[must_use]
    pub const fn with_intervals(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Waits for an installation to reach a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InstallationFailed`] if the installation fails or
    /// is cancelled, [`ApiError::Timeout`] if it is still running when the
    /// timeout elapses, or any error from the status request.
    pub async fn wait(&self, client: &OpsManClient, installation_id: u64) -> Result<Installation> {
        let start = Instant::now();
        let mut installation = Installation::started(installation_id);

        info!("Waiting for installation {installation_id} to finish");

        loop {
            let status = client.get_installation_status(installation_id).await?;
            installation.observe(status);

            match status {
                InstallationStatus::Succeeded => {
                    info!(
                        "Installation {installation_id} succeeded after {}s",
                        start.elapsed().as_secs()
                    );
                    return Ok(installation);
                }
                InstallationStatus::Failed | InstallationStatus::Cancelled => {
                    warn!("Installation {installation_id} finished with status {status}");
                    return Err(OpsmanError::Api(ApiError::InstallationFailed {
                        installation_id,
                        status: status.to_string(),
                    }));
                }
                InstallationStatus::Running | InstallationStatus::Unknown => {
                    debug!("Installation {installation_id} is {status}");
                }
            }

            if start.elapsed() >= self.timeout {
                return Err(OpsmanError::Api(ApiError::Timeout {
                    installation_id,
                    waited_secs: start.elapsed().as_secs(),
                }));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Default for InstallationWaiter {
    fn default() -> Self {
        Self::from_settings(&ApplySettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpsManClient {
        OpsManClient::new(&ProviderConfig::with_token("opsman.example.com", "t"))
            .unwrap()
            .with_base_url(server.uri())
    }

    fn fast_waiter(timeout_ms: u64) -> InstallationWaiter {
        InstallationWaiter::with_intervals(
            Duration::from_millis(10),
            Duration::from_millis(timeout_ms),
        )
    }

    async fn mount_status(server: &MockServer, status: &str, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path("/api/v0/installations/5"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": status })),
            );
        match times {
            Some(n) => mock.up_to_n_times(n).mount(server).await,
            None => mock.mount(server).await,
        }
    }

    #[tokio::test]
    async fn test_wait_returns_after_running_then_succeeded() {
        let server = MockServer::start().await;
        mount_status(&server, "running", Some(2)).await;
        mount_status(&server, "succeeded", None).await;

        let installation = fast_waiter(5_000).wait(&client(&server), 5).await.unwrap();
        assert_eq!(installation.id, 5);
        assert_eq!(installation.status, InstallationStatus::Succeeded);
        assert!(installation.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_installation_is_an_error() {
        let server = MockServer::start().await;
        mount_status(&server, "failed", None).await;

        let err = fast_waiter(5_000).wait(&client(&server), 5).await.unwrap_err();
        match err {
            OpsmanError::Api(ApiError::InstallationFailed {
                installation_id,
                status,
            }) => {
                assert_eq!(installation_id, 5);
                assert_eq!(status, "failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_installation_is_an_error() {
        let server = MockServer::start().await;
        mount_status(&server, "cancelled", None).await;

        let err = fast_waiter(5_000).wait(&client(&server), 5).await.unwrap_err();
        assert!(matches!(
            err,
            OpsmanError::Api(ApiError::InstallationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_running_past_timeout_times_out() {
        let server = MockServer::start().await;
        mount_status(&server, "running", None).await;

        let err = fast_waiter(50).wait(&client(&server), 5).await.unwrap_err();
        assert!(matches!(err, OpsmanError::Api(ApiError::Timeout { installation_id: 5, .. })));
    }

    #[test]
    fn test_from_settings() {
        let waiter = InstallationWaiter::from_settings(&ApplySettings {
            wait: true,
            poll_interval_secs: 3,
            timeout_secs: 60,
        });
        assert_eq!(waiter.poll_interval, Duration::from_secs(3));
        assert_eq!(waiter.timeout, Duration::from_secs(60));
    }
}
