mod session;

pub use session::{
    DistributionSession, PairedDevice, SealPlan, SessionError, SessionPhase, LOCAL_SHARE_INDEX,
    MIN_THRESHOLD,
};
