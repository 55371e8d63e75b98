//! # Application Dependencies / 应用依赖
//!
//! Plain parameter grouping for the orchestrators. No build steps and no
//! defaults; the root crate's wiring fills every field.

use std::sync::Arc;

use sl_core::ports::{
    AuthenticatorPort, ClockPort, DiscoveryPort, SecretSharingPort, ShardStorePort,
};
use sl_core::{RemoteDeviceInfo, Settings};
use sl_network::ConnectionGate;

use crate::event::EventHub;

#[derive(Clone)]
pub struct AppDeps {
    // Identity / 本机身份
    pub local_device: RemoteDeviceInfo,
    pub settings: Arc<Settings>,

    // Network / 网络
    pub discovery: Arc<dyn DiscoveryPort>,
    pub gate: Arc<dyn ConnectionGate>,

    // Storage and crypto / 存储与密码学
    pub shard_store: Arc<dyn ShardStorePort>,
    pub secret_sharing: Arc<dyn SecretSharingPort>,
    pub authenticator: Arc<dyn AuthenticatorPort>,

    // System / 系统
    pub clock: Arc<dyn ClockPort>,
    pub events: Arc<EventHub>,
}
