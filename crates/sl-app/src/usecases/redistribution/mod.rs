mod controller;

pub use controller::{RedistributionController, RedistributionError};
