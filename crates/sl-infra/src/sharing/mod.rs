mod gf256;
mod shamir;

pub use shamir::ShamirSecretSharing;
