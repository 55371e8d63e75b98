//! Redistribution controller
//!
//! Unlock the wallet key, rebuild the secret from the current shards, then
//! open a fresh distribution session one version higher whose advertisement
//! carries a signed witness.

use sl_core::crypto::RedistributionWitness;
use sl_core::discovery::ServiceFunction;
use sl_core::ports::AuthError;
use sl_core::{SecretString, SessionId};
use thiserror::Error;
use tracing::{info, warn};

use crate::deps::AppDeps;
use crate::usecases::aggregation::{AggregationError, ShardAggregator};
use crate::usecases::distribution::{DistributionError, DistributorOptions, ShardDistributor};

#[derive(Debug, Error)]
pub enum RedistributionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

pub struct RedistributionController {
    deps: AppDeps,
}

impl RedistributionController {
    pub fn new(deps: AppDeps) -> Self {
        Self { deps }
    }

    /// Returns a started distributor for the new version. The caller drives
    /// threshold changes and sealing exactly as for a first distribution.
    pub async fn redistribute(
        &self,
        session_id: &SessionId,
        pin: &SecretString,
    ) -> Result<ShardDistributor, RedistributionError> {
        // Check the pin before touching the network.
        let signing_key = self
            .deps
            .authenticator
            .request_signing_key(pin)
            .await
            .inspect_err(|err| warn!(error = %err, "wallet key unavailable"))?;

        let rebuilt = ShardAggregator::new(self.deps.clone())
            .collect(session_id)
            .await?;

        let version = rebuilt.version + 1;
        let witness =
            RedistributionWitness::sign(&signing_key, self.deps.clock.now_ms(), version);
        let new_session = SessionId::new();

        let distributor = ShardDistributor::new(
            self.deps.clone(),
            new_session.clone(),
            version,
            rebuilt.secret,
            DistributorOptions {
                function: ServiceFunction::Redistribution,
                extra_attributes: witness.to_attributes(),
            },
        );
        distributor.start().await?;

        info!(
            previous = %session_id,
            session_id = %new_session,
            version = version,
            "redistribution session open"
        );
        Ok(distributor)
    }
}
