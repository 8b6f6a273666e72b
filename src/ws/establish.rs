use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use super::config::RetryPolicy;
use super::error::WsError;
use super::traits::Connector;
use crate::Result;

/// Opens connections, retrying failed attempts according to a [`RetryPolicy`].
///
/// With the default policy (infinite attempts, fixed 3 second delay) [`Establisher::establish`]
/// only returns once a connection is up; connect failures are logged, never surfaced. A bounded
/// policy turns exhaustion into [`WsError::RetriesExhausted`].
#[derive(Debug, Clone)]
pub struct Establisher<C> {
    connector: C,
    policy: RetryPolicy,
}

impl<C: Connector> Establisher<C> {
    /// Wrap `connector`, dialing on the schedule given by `policy`.
    #[must_use]
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self { connector, policy }
    }

    /// Retry policy applied to failed attempts.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Connect to `endpoint`, blocking the calling task until an attempt succeeds.
    pub async fn establish(&self, endpoint: &Url) -> Result<C::Transport> {
        let mut schedule = self.policy.schedule();
        let mut failures = 0_u32;

        loop {
            let error = match self.connector.connect(endpoint).await {
                Ok(transport) => {
                    info!(%endpoint, failures, "server connected");
                    return Ok(transport);
                }
                Err(e) => e,
            };

            failures = failures.saturating_add(1);
            warn!(%endpoint, attempt = failures, error = %error, "establish connection failed");

            if self.policy.is_exhausted(failures) {
                return Err(WsError::RetriesExhausted { attempts: failures }.into());
            }

            match schedule.next_backoff() {
                Some(delay) => sleep(delay).await,
                None => return Err(WsError::RetriesExhausted { attempts: failures }.into()),
            }
        }
    }
}
