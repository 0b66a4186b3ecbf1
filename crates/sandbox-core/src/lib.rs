pub mod access;
pub mod canonical_path;
pub mod config;
pub mod context;
pub mod error;
pub mod ids;
pub mod policy_flags;
pub mod report;

pub use access::{Action, AccessCheckResult, PathValidity, ReportLevel};
pub use canonical_path::{CanonicalPath, PrefixKind};
pub use config::Config;
pub use context::{Existence, FileOperationContext, FileReadContext};
pub use error::{ManifestDecodeError, ReportChannelError, ResolveError, SandboxError};
pub use ids::{CorrelationId, OperationId, PipId, Usn};
pub use policy_flags::PolicyFlags;
pub use report::{ReportAction, ReportRecord, ReportReportLevel};
