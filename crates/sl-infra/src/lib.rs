pub mod fs;
pub mod sharing;
pub mod time;

pub use fs::FileShardStore;
pub use sharing::ShamirSecretSharing;
pub use time::SystemClock;
