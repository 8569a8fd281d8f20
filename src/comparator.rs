use crate::models::{CheckResult, CheckStatus};

/// Judge a file by how far its measured bitrate falls below the declared one.
///
/// The tolerance margin is `tolerance_percent` of the *declared* bitrate. A
/// file fails only when `declared - measured` exceeds that margin; a measured
/// bitrate above the declared one always passes.
pub fn compare(declared_kbps: u32, measured_kbps: u32, tolerance_percent: u8) -> CheckResult {
    let difference = declared_kbps as i64 - measured_kbps as i64;
    // difference > tolerance/100 * declared, kept in integers
    let exceeds = difference * 100 > tolerance_percent as i64 * declared_kbps as i64;

    let result = if exceeds {
        CheckResult::failed(format!(
            "Actual {}kbps vs declared {}kbps",
            measured_kbps, declared_kbps
        ))
    } else {
        CheckResult::passed(format!(
            "{}kbps (within {}% tolerance)",
            measured_kbps, tolerance_percent
        ))
    };
    result.with_bitrates(Some(declared_kbps), Some(measured_kbps))
}
