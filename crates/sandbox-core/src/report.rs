use serde::{Deserialize, Serialize};

use crate::access::{Action, ReportLevel};
use crate::ids::{CorrelationId, OperationId, PipId, Usn};

/// One line on the report channel: the controller-facing shape of a single
/// file-access or process-lifecycle observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub operation_id: OperationId,
    pub correlation_id: CorrelationId,
    pub pip_id: PipId,
    pub operation_name: String,
    pub path: String,
    pub access_mask: u32,
    pub action: ReportAction,
    pub report_level: ReportReportLevel,
    pub error_code: u32,
    pub usn: Usn,
    pub filter: Option<String>,
}

/// `serde`-friendly mirror of [`Action`] — kept distinct so the wire schema
/// does not change shape if the in-memory enum grows variants used only
/// internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportAction {
    Allow,
    Deny,
    Warn,
}

impl From<Action> for ReportAction {
    fn from(a: Action) -> Self {
        match a {
            Action::Allow => ReportAction::Allow,
            Action::Deny => ReportAction::Deny,
            Action::Warn => ReportAction::Warn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportReportLevel {
    Ignore,
    Report,
    ReportExplicit,
}

impl From<ReportLevel> for ReportReportLevel {
    fn from(r: ReportLevel) -> Self {
        match r {
            ReportLevel::Ignore => ReportReportLevel::Ignore,
            ReportLevel::Report => ReportReportLevel::Report,
            ReportLevel::ReportExplicit => ReportReportLevel::ReportExplicit,
        }
    }
}

impl ReportRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        operation_id: OperationId,
        correlation_id: CorrelationId,
        pip_id: PipId,
        operation_name: impl Into<String>,
        path: impl Into<String>,
        access_mask: u32,
        action: Action,
        report_level: ReportLevel,
        error_code: u32,
        usn: Usn,
    ) -> Self {
        Self {
            operation_id,
            correlation_id,
            pip_id,
            operation_name: operation_name.into(),
            path: path.into(),
            access_mask,
            action: action.into(),
            report_level: report_level.into(),
            error_code,
            usn,
            filter: None,
        }
    }
}
