use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;

use crate::config::HealthCheckConfig;
use crate::error::DeployError;

/// Retry budget for one replica.
#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    pub retries: u32,
    pub interval: Duration,
    pub timeout: Duration,
}

impl ProbePolicy {
    pub fn from_config(hc: &HealthCheckConfig) -> Self {
        Self {
            retries: hc.retries.max(1),
            interval: Duration::from_secs(hc.interval),
            timeout: Duration::from_secs(hc.timeout),
        }
    }

    /// Upper bound on how long a single replica can be probed.
    pub fn max_wait(&self) -> Duration {
        (self.timeout + self.interval) * self.retries
    }
}

/// Body a healthy replica returns. Every field is optional so a bare 200
/// still counts.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct HealthReport {
    pub status: Option<String>,
    pub database: Option<serde_json::Value>,
    pub timestamp: Option<String>,
}

/// One health request against one endpoint.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// `Ok` when the replica answered with a success status, `Err` with a
    /// human-readable reason otherwise.
    async fn check(&self, endpoint: &str, timeout: Duration) -> Result<Option<HealthReport>, String>;
}

#[derive(Default)]
pub struct HttpHealthCheck {
    client: reqwest::Client,
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    async fn check(&self, endpoint: &str, timeout: Duration) -> Result<Option<HealthReport>, String> {
        let response = self
            .client
            .get(endpoint)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        Ok(response.json::<HealthReport>().await.ok())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaHealth {
    Healthy {
        attempts: u32,
        report: Option<HealthReport>,
    },
    Unhealthy {
        attempts: u32,
        last_error: String,
    },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ReplicaVerdict {
    pub endpoint: String,
    pub health: ReplicaHealth,
}

impl ReplicaVerdict {
    pub fn is_healthy(&self) -> bool {
        matches!(self.health, ReplicaHealth::Healthy { .. })
    }

    /// Commit-gating error for a replica that did not pass.
    pub fn failure(&self, replica: &str) -> Option<DeployError> {
        match &self.health {
            ReplicaHealth::Healthy { .. } => None,
            ReplicaHealth::Unhealthy { attempts, .. } => Some(DeployError::HealthProbeTimeout {
                replica: replica.to_string(),
                attempts: *attempts,
            }),
            ReplicaHealth::Cancelled => Some(DeployError::HealthProbeTimeout {
                replica: replica.to_string(),
                attempts: 0,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FleetVerdict {
    pub replicas: Vec<ReplicaVerdict>,
}

impl FleetVerdict {
    /// All-or-nothing: one failing replica fails the fleet.
    pub fn is_healthy(&self) -> bool {
        self.replicas.iter().all(ReplicaVerdict::is_healthy)
    }

    pub fn healthy_count(&self) -> usize {
        self.replicas.iter().filter(|r| r.is_healthy()).count()
    }
}

pub struct FleetHealthProber {
    check: Arc<dyn HealthCheck>,
    policy: ProbePolicy,
}

impl FleetHealthProber {
    pub fn new(check: Arc<dyn HealthCheck>, policy: ProbePolicy) -> Self {
        Self { check, policy }
    }

    pub fn http(policy: ProbePolicy) -> Self {
        Self::new(Arc::new(HttpHealthCheck::default()), policy)
    }

    pub fn policy(&self) -> ProbePolicy {
        self.policy
    }

    /// Probes every endpoint concurrently. Verdicts come back in input order.
    pub async fn probe(&self, endpoints: &[String], cancel: &watch::Receiver<bool>) -> FleetVerdict {
        let probes = endpoints
            .iter()
            .map(|endpoint| self.probe_one(endpoint, cancel.clone()));

        FleetVerdict {
            replicas: join_all(probes).await,
        }
    }

    async fn probe_one(&self, endpoint: &str, mut cancel: watch::Receiver<bool>) -> ReplicaVerdict {
        let verdict = |health| ReplicaVerdict {
            endpoint: endpoint.to_string(),
            health,
        };

        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.policy.retries {
            if *cancel.borrow() {
                return verdict(ReplicaHealth::Cancelled);
            }

            debug!("Health check {} attempt {}/{}", endpoint, attempt, self.policy.retries);

            let request = tokio::time::timeout(
                self.policy.timeout,
                self.check.check(endpoint, self.policy.timeout),
            );
            let outcome = tokio::select! {
                outcome = request => outcome,
                _ = cancelled(&mut cancel) => return verdict(ReplicaHealth::Cancelled),
            };

            match outcome {
                Ok(Ok(report)) => {
                    debug!("{} healthy after {} attempt(s): {:?}", endpoint, attempt, report);
                    return verdict(ReplicaHealth::Healthy {
                        attempts: attempt,
                        report,
                    });
                }
                Ok(Err(reason)) => last_error = reason,
                Err(_) => last_error = format!("timed out after {:?}", self.policy.timeout),
            }

            debug!("{} not healthy yet: {}", endpoint, last_error);

            if attempt < self.policy.retries {
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.interval) => {}
                    _ = cancelled(&mut cancel) => return verdict(ReplicaHealth::Cancelled),
                }
            }
        }

        verdict(ReplicaHealth::Unhealthy {
            attempts: self.policy.retries,
            last_error,
        })
    }
}

/// Resolves once cancellation is requested. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy(retries: u32) -> ProbePolicy {
        ProbePolicy {
            retries,
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        }
    }

    fn never_cancelled() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "healthy",
                "database": "connected",
                "timestamp": "2026-03-01T12:00:00Z"
            })))
            .mount(&server)
            .await;
        server
    }

    async fn failing_server(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn healthy_replica_reports_payload() {
        let server = healthy_server().await;
        let prober = FleetHealthProber::http(fast_policy(3));
        let (_tx, rx) = never_cancelled();

        let verdict = prober
            .probe(&[format!("{}/health", server.uri())], &rx)
            .await;

        assert!(verdict.is_healthy());
        match &verdict.replicas[0].health {
            ReplicaHealth::Healthy { attempts, report } => {
                assert_eq!(*attempts, 1);
                let report = report.as_ref().unwrap();
                assert_eq!(report.status.as_deref(), Some("healthy"));
                assert_eq!(report.database, Some(serde_json::json!("connected")));
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[tokio::test]
    async fn server_error_exhausts_retries() {
        let server = failing_server(503).await;
        let prober = FleetHealthProber::http(fast_policy(3));
        let (_tx, rx) = never_cancelled();

        let verdict = prober
            .probe(&[format!("{}/health", server.uri())], &rx)
            .await;

        assert!(!verdict.is_healthy());
        match &verdict.replicas[0].health {
            ReplicaHealth::Unhealthy { attempts, last_error } => {
                assert_eq!(*attempts, 3);
                assert!(last_error.contains("503"));
            }
            other => panic!("unexpected verdict {:?}", other),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn replica_that_warms_up_passes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let prober = FleetHealthProber::http(fast_policy(5));
        let (_tx, rx) = never_cancelled();
        let verdict = prober
            .probe(&[format!("{}/health", server.uri())], &rx)
            .await;

        match &verdict.replicas[0].health {
            ReplicaHealth::Healthy { attempts, report } => {
                assert_eq!(*attempts, 3);
                assert!(report.is_none());
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[tokio::test]
    async fn slow_replica_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let policy = ProbePolicy {
            retries: 2,
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(100),
        };
        let prober = FleetHealthProber::http(policy);
        let (_tx, rx) = never_cancelled();

        let started = Instant::now();
        let verdict = prober
            .probe(&[format!("{}/health", server.uri())], &rx)
            .await;

        assert!(!verdict.is_healthy());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn one_bad_replica_fails_the_fleet() {
        let good_a = healthy_server().await;
        let good_b = healthy_server().await;
        let bad = failing_server(500).await;

        let prober = FleetHealthProber::http(fast_policy(2));
        let (_tx, rx) = never_cancelled();
        let endpoints = vec![
            format!("{}/health", good_a.uri()),
            format!("{}/health", bad.uri()),
            format!("{}/health", good_b.uri()),
        ];

        let verdict = prober.probe(&endpoints, &rx).await;

        assert!(!verdict.is_healthy());
        assert_eq!(verdict.healthy_count(), 2);
        assert!(!verdict.replicas[1].is_healthy());
        assert!(matches!(
            verdict.replicas[1].failure("10.0.0.2"),
            Some(DeployError::HealthProbeTimeout { attempts: 2, .. })
        ));
    }

    struct NeverAnswers;

    #[async_trait]
    impl HealthCheck for NeverAnswers {
        async fn check(&self, _endpoint: &str, _timeout: Duration) -> Result<Option<HealthReport>, String> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_ends_probing_early() {
        let policy = ProbePolicy {
            retries: 100,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        };
        let prober = FleetHealthProber::new(Arc::new(NeverAnswers), policy);
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let started = Instant::now();
        let verdict = prober
            .probe(&["http://10.0.0.1/health".to_string(), "http://10.0.0.2/health".to_string()], &rx)
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(verdict
            .replicas
            .iter()
            .all(|r| r.health == ReplicaHealth::Cancelled));
        assert!(!verdict.is_healthy());
    }

    #[test]
    fn wait_is_bounded_by_policy() {
        let policy = ProbePolicy {
            retries: 4,
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(3),
        };
        assert_eq!(policy.max_wait(), Duration::from_secs(20));
    }
}
