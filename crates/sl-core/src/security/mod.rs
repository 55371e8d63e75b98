mod secret;

pub use secret::{SecretBytes, SecretString};
