//! `ShardLink`: one device's entry point into every flow.

use sl_app::{
    find_service, AggregationError, AppDeps, DistributionError, DistributorOptions, HolderError,
    HolderOutcome, LookupError, ReceiverError, ReconstructedSecret, RedistributionController,
    RedistributionError, ServiceQuery, ShardAggregator, ShardDistributor, ShardHolder,
    ShardReceiver,
};
use sl_core::crypto::{WalletVerifyingKey, WitnessVerifier};
use sl_core::discovery::{ResolvedService, ServiceFunction};
use sl_core::security::SecretBytes;
use sl_core::{RemoteDeviceInfo, SecretString, SessionId, Settings, Shard, ShardDigest, ShardEvent};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::bootstrap::{wire_dependencies, ExternalPorts, WiringResult};

/// Version of the first distribution of a secret.
pub const INITIAL_VERSION: u64 = 1;

#[derive(Clone)]
pub struct ShardLink {
    deps: AppDeps,
}

impl ShardLink {
    pub fn new(settings: Settings, ports: ExternalPorts) -> WiringResult<Self> {
        Ok(Self::from_deps(wire_dependencies(settings, ports)?))
    }

    pub fn from_deps(deps: AppDeps) -> Self {
        Self { deps }
    }

    pub fn local_device(&self) -> &RemoteDeviceInfo {
        &self.deps.local_device
    }

    pub fn settings(&self) -> &Settings {
        &self.deps.settings
    }

    /// Presentation events: pairing codes, participants, progress, outcomes.
    pub async fn subscribe(&self) -> mpsc::Receiver<ShardEvent> {
        self.deps.events.subscribe().await
    }

    /// Open a new distribution session for `secret` and start advertising it.
    pub async fn distribute(&self, secret: SecretBytes) -> Result<ShardDistributor, DistributionError> {
        let distributor = ShardDistributor::new(
            self.deps.clone(),
            SessionId::new(),
            INITIAL_VERSION,
            secret,
            DistributorOptions::default(),
        );
        distributor.start().await?;
        Ok(distributor)
    }

    /// Wait for a peer's advertisement of `function`, optionally for one session.
    pub async fn find(
        &self,
        function: ServiceFunction,
        session_id: Option<SessionId>,
        timeout: Duration,
    ) -> Result<ResolvedService, LookupError> {
        let mut query = ServiceQuery::new(function).excluding(self.deps.local_device.device_id.clone());
        if let Some(session_id) = session_id {
            query = query.session(session_id);
        }
        find_service(self.deps.discovery.as_ref(), &query, timeout).await
    }

    pub fn receiver(&self) -> ShardReceiver {
        ShardReceiver::new(self.deps.clone())
    }

    /// Join a distribution host once and save the shard it hands out.
    pub async fn receive(
        &self,
        service: &ResolvedService,
        expected_digest: Option<ShardDigest>,
    ) -> Result<Shard, ReceiverError> {
        self.receiver().join(service, expected_digest).await
    }

    /// Hand this device's shard to an aggregator.
    pub async fn provide(&self, aggregator: &ResolvedService) -> Result<HolderOutcome, HolderError> {
        ShardHolder::new(self.deps.clone()).serve(aggregator).await
    }

    pub async fn aggregate(&self, session_id: &SessionId) -> Result<ReconstructedSecret, AggregationError> {
        ShardAggregator::new(self.deps.clone()).collect(session_id).await
    }

    pub async fn redistribute(
        &self,
        session_id: &SessionId,
        pin: &SecretString,
    ) -> Result<ShardDistributor, RedistributionError> {
        RedistributionController::new(self.deps.clone())
            .redistribute(session_id, pin)
            .await
    }

    /// Verifier for redistribution offers, using the configured freshness
    /// window and clock skew allowance.
    pub fn witness_verifier(&self, trusted_key: WalletVerifyingKey, held_version: Option<u64>) -> WitnessVerifier {
        let settings = &self.deps.settings.redistribution;
        let verifier = WitnessVerifier::new(
            trusted_key,
            settings.witness_freshness_ms,
            settings.max_clock_skew_ms,
        );
        match held_version {
            Some(version) => verifier.with_held_version(version),
            None => verifier,
        }
    }
}
