pub mod classify;
pub mod command;
pub mod env;
pub mod exit;
pub mod fusion;
pub mod health;
pub mod installer;
pub mod log_buffer;
pub mod logfile;
pub mod native_config;
pub mod plugins;
pub mod port;
pub mod probe;
pub mod resolver;
pub mod state;
pub mod supervisor;

pub use classify::{Classifier, Evidence, EvidenceSource, Signal};
pub use fusion::{fuse, Connectivity};
pub use health::{assess, status_report, HealthAssessment, HealthReport, HealthVerdict};
pub use installer::{InstallPhase, InstallProgress, Installer};
pub use log_buffer::{LogBuffer, LogEntry, LogStream};
pub use plugins::{parse_plugin_table, PluginRecord, PluginStatus};
pub use resolver::{EngineLocation, EngineSource, Resolver};
pub use state::{EngineLifecycle, Lifecycle, SupervisorState};
pub use supervisor::Supervisor;
