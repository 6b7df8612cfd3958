//! "HHhMM" duration labels.
//!
//! Two roundings are in use and they are intentionally different: per-point
//! labels truncate to the minute, axis tick labels round to the nearest
//! `n` minutes (ties to even).

/// Label for a duration in seconds, truncated to the whole minute.
///
/// ```
/// use healthtrend::duration::format_hhmm;
/// assert_eq!(format_hhmm(5400.0), "01h30");
/// assert_eq!(format_hhmm(5399.0), "01h29");
/// ```
pub fn format_hhmm(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--h--".to_string();
    }
    render((seconds.abs() / 60.0).floor() as u64, seconds < 0.0)
}

/// Label for a duration in seconds, rounded to the nearest `step_minutes`
pub fn format_hhmm_rounded(seconds: f64, step_minutes: u32) -> String {
    if !seconds.is_finite() {
        return "--h--".to_string();
    }
    let step = f64::from(step_minutes.max(1)) * 60.0;
    let rounded = (seconds.abs() / step).round_ties_even() * step;
    render((rounded / 60.0).round() as u64, seconds < 0.0 && rounded > 0.0)
}

fn render(total_minutes: u64, negative: bool) -> String {
    let sign = if negative { "-" } else { "" };
    format!("{}{:02}h{:02}", sign, total_minutes / 60, total_minutes % 60)
}
