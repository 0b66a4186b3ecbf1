//! JSON rendering of recorded frames, used by the CLI's `report replay`
//! view. The wire format is already JSON per record (see [`crate::framing`]);
//! this module is only about presenting a whole session at once.

use sandbox_core::ReportRecord;

/// Renders `records` as a pretty-printed JSON array, in the order they were
/// read off the channel.
pub fn render_session(records: &[ReportRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}
