pub mod access;
pub mod deployment;
pub mod helm;
pub mod installer;
pub mod k8s;
pub mod registry;
pub mod storage;
pub mod values;

pub use deployment::{Deployer, Deployers};
pub use installer::{InstallationService, InstallerSettings};
pub use k8s::*;
pub use registry::*;
