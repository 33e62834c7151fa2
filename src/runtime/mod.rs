pub mod deployer;
pub mod host;
pub mod orchestrator;
pub mod unit;

pub use deployer::{DeployError, DeploymentId, DeploymentRequest, UnitDeployer};
pub use host::{DeploymentInfo, Runtime};
pub use orchestrator::{deployment_summary, DeploymentOutcome, LaunchError, Orchestrator};
pub use unit::{UnitContext, UnitError, UnitFactory, WorkerUnit};
