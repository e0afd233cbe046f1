//! Human-readable durations for progress displays
//!
//! Batch runs last seconds to hours, so three formats are enough:
//! - under 100 seconds: `42s`
//! - under 100 minutes: `M:SS`
//! - otherwise: `H:MM:SS`

const SHORT_FORMAT_MAX: u64 = 100;
const MEDIUM_FORMAT_MAX: u64 = 6000;

/// Format a duration in whole seconds
///
/// ```
/// use pcat_common::human_time::format_duration;
///
/// assert_eq!(format_duration(42), "42s");
/// assert_eq!(format_duration(330), "5:30");
/// assert_eq!(format_duration(3661), "1:01:01");
/// ```
pub fn format_duration(seconds: u64) -> String {
    if seconds < SHORT_FORMAT_MAX {
        format!("{}s", seconds)
    } else if seconds < MEDIUM_FORMAT_MAX {
        format!("{}:{:02}", seconds / 60, seconds % 60)
    } else {
        let hours = seconds / 3600;
        let mins = (seconds % 3600) / 60;
        let secs = seconds % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    }
}

/// Format an estimated remaining time; unknown estimates render as `--`
pub fn format_eta(seconds: Option<u64>) -> String {
    match seconds {
        Some(s) => format_duration(s),
        None => "--".to_string(),
    }
}

/// Elapsed / remaining pair as shown next to a progress counter
///
/// ```
/// use pcat_common::human_time::format_progress_times;
///
/// assert_eq!(format_progress_times(65, Some(130)), "elapsed 65s, eta 2:10");
/// assert_eq!(format_progress_times(5, None), "elapsed 5s, eta --");
/// ```
pub fn format_progress_times(elapsed: u64, remaining: Option<u64>) -> String {
    format!(
        "elapsed {}, eta {}",
        format_duration(elapsed),
        format_eta(remaining)
    )
}
