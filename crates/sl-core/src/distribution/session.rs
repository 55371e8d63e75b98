//! Distribution session rules
//!
//! ```text
//! Collecting { threshold M, participants }
//!    │ join / leave / set_threshold      (2 ≤ M ≤ approved + 1)
//!    │
//!    │ seal (explicit, irreversible)
//!    ▼
//! Sealed { plan }                        (joins rejected, seal is a no-op)
//! ```
//!
//! The distributor's own device always holds share index 1, which is why the
//! upper bound on M is `approved + 1`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::RemoteDeviceInfo;
use crate::ids::{DeviceId, SessionId};

pub const MIN_THRESHOLD: u8 = 2;
pub const LOCAL_SHARE_INDEX: u8 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} is sealed")]
    Sealed(SessionId),

    #[error("session is full ({max_shares} shares)")]
    Full { max_shares: u8 },

    #[error("device {0} already joined")]
    AlreadyJoined(DeviceId),

    #[error("no approved participants")]
    NoParticipants,

    #[error("threshold {threshold} outside [{min}, {max}]")]
    ThresholdOutOfRange { threshold: u8, min: u8, max: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Collecting,
    Sealed,
}

/// A device that completed handshake and greeting with the distributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub info: RemoteDeviceInfo,
    pub joined_at: DateTime<Utc>,
    pub approved: bool,
}

/// Frozen outcome of sealing: who receives which share index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealPlan {
    pub session_id: SessionId,
    pub version: u64,
    pub threshold: u8,
    pub total: u8,
    pub assignments: Vec<(DeviceId, u8)>,
}

#[derive(Debug, Clone)]
pub struct DistributionSession {
    session_id: SessionId,
    version: u64,
    threshold: u8,
    max_shares: u8,
    participants: Vec<PairedDevice>,
    sealed: Option<SealPlan>,
}

impl DistributionSession {
    pub fn new(session_id: SessionId, version: u64, preset_threshold: u8, max_shares: u8) -> Self {
        Self {
            session_id,
            version,
            threshold: preset_threshold.max(MIN_THRESHOLD),
            max_shares: max_shares.max(MIN_THRESHOLD),
            participants: Vec::new(),
            sealed: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn phase(&self) -> SessionPhase {
        if self.sealed.is_some() {
            SessionPhase::Sealed
        } else {
            SessionPhase::Collecting
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    pub fn participants(&self) -> &[PairedDevice] {
        &self.participants
    }

    pub fn approved_count(&self) -> usize {
        self.participants.iter().filter(|p| p.approved).count()
    }

    /// Largest threshold currently allowed: approved participants plus this device.
    pub fn max_threshold(&self) -> u8 {
        u8::try_from(self.approved_count() + 1).unwrap_or(u8::MAX)
    }

    pub fn join(&mut self, device: PairedDevice) -> Result<(), SessionError> {
        if self.is_sealed() {
            return Err(SessionError::Sealed(self.session_id.clone()));
        }
        if self
            .participants
            .iter()
            .any(|p| p.info.device_id == device.info.device_id)
        {
            return Err(SessionError::AlreadyJoined(device.info.device_id));
        }
        if self.participants.len() + 1 >= usize::from(self.max_shares) {
            return Err(SessionError::Full {
                max_shares: self.max_shares,
            });
        }
        self.participants.push(device);
        Ok(())
    }

    /// Drop a participant that disconnected before sealing. Once sealed the
    /// participant list is frozen and this returns `None`.
    pub fn leave(&mut self, device_id: &DeviceId) -> Option<PairedDevice> {
        if self.is_sealed() {
            return None;
        }
        let position = self
            .participants
            .iter()
            .position(|p| &p.info.device_id == device_id)?;
        let removed = self.participants.remove(position);
        self.threshold = self.threshold.min(self.max_threshold()).max(MIN_THRESHOLD);
        Some(removed)
    }

    pub fn set_threshold(&mut self, threshold: u8) -> Result<(), SessionError> {
        if self.is_sealed() {
            return Err(SessionError::Sealed(self.session_id.clone()));
        }
        if self.approved_count() == 0 {
            return Err(SessionError::NoParticipants);
        }
        self.check_threshold(threshold)?;
        self.threshold = threshold;
        Ok(())
    }

    /// Freeze the participant list and assign share indices. Sealing an
    /// already sealed session returns the existing plan unchanged.
    pub fn seal(&mut self) -> Result<SealPlan, SessionError> {
        if let Some(plan) = &self.sealed {
            return Ok(plan.clone());
        }
        if self.approved_count() == 0 {
            return Err(SessionError::NoParticipants);
        }
        self.check_threshold(self.threshold)?;

        let assignments: Vec<(DeviceId, u8)> = self
            .participants
            .iter()
            .filter(|p| p.approved)
            .zip(LOCAL_SHARE_INDEX + 1..)
            .map(|(p, index)| (p.info.device_id.clone(), index))
            .collect();

        let plan = SealPlan {
            session_id: self.session_id.clone(),
            version: self.version,
            threshold: self.threshold,
            total: self.max_threshold(),
            assignments,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            session_id = %plan.session_id,
            version = plan.version,
            threshold = plan.threshold,
            total = plan.total,
            "distribution session sealed"
        );

        self.sealed = Some(plan.clone());
        Ok(plan)
    }

    fn check_threshold(&self, threshold: u8) -> Result<(), SessionError> {
        let max = self.max_threshold();
        if threshold < MIN_THRESHOLD || threshold > max {
            return Err(SessionError::ThresholdOutOfRange {
                threshold,
                min: MIN_THRESHOLD,
                max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Platform;

    fn device(id: &str) -> PairedDevice {
        PairedDevice {
            info: RemoteDeviceInfo {
                device_id: DeviceId::from(id),
                name: id.to_string(),
                platform: Platform::Linux,
                model: "test".to_string(),
                app_version: "0.1.0".to_string(),
            },
            joined_at: Utc::now(),
            approved: true,
        }
    }

    fn session() -> DistributionSession {
        DistributionSession::new(SessionId::from("s"), 1, 2, 10)
    }

    #[test]
    fn preset_two_seals_after_single_join() {
        let mut s = session();
        s.join(device("a")).unwrap();

        let plan = s.seal().unwrap();
        assert_eq!(plan.threshold, 2);
        assert_eq!(plan.total, 2);
        assert_eq!(plan.assignments, vec![(DeviceId::from("a"), 2)]);
    }

    #[test]
    fn seal_without_participants_is_rejected() {
        let mut s = session();
        assert_eq!(s.seal(), Err(SessionError::NoParticipants));
        assert_eq!(s.phase(), SessionPhase::Collecting);
    }

    #[test]
    fn threshold_bounds_track_approved_count() {
        let mut s = session();
        s.join(device("a")).unwrap();
        s.join(device("b")).unwrap();

        assert_eq!(s.set_threshold(3), Ok(()));
        assert_eq!(
            s.set_threshold(4),
            Err(SessionError::ThresholdOutOfRange {
                threshold: 4,
                min: 2,
                max: 3
            })
        );
        assert!(matches!(
            s.set_threshold(1),
            Err(SessionError::ThresholdOutOfRange { .. })
        ));
    }

    #[test]
    fn leaving_clamps_threshold() {
        let mut s = session();
        s.join(device("a")).unwrap();
        s.join(device("b")).unwrap();
        s.set_threshold(3).unwrap();

        s.leave(&DeviceId::from("b")).unwrap();
        assert_eq!(s.threshold(), 2);
        assert_eq!(s.approved_count(), 1);
    }

    #[test]
    fn sealing_twice_returns_same_plan_and_blocks_joins() {
        let mut s = session();
        s.join(device("a")).unwrap();
        let first = s.seal().unwrap();
        let second = s.seal().unwrap();
        assert_eq!(first, second);

        assert_eq!(
            s.join(device("late")),
            Err(SessionError::Sealed(SessionId::from("s")))
        );
        assert_eq!(s.set_threshold(2), Err(SessionError::Sealed(SessionId::from("s"))));
        assert!(s.leave(&DeviceId::from("a")).is_none());
    }

    #[test]
    fn join_respects_max_shares_and_duplicates() {
        let mut s = DistributionSession::new(SessionId::from("s"), 1, 2, 3);
        s.join(device("a")).unwrap();
        assert_eq!(
            s.join(device("a")),
            Err(SessionError::AlreadyJoined(DeviceId::from("a")))
        );
        s.join(device("b")).unwrap();
        assert_eq!(s.join(device("c")), Err(SessionError::Full { max_shares: 3 }));
    }
}
