//! Raw attempt values and their human formatting.
//!
//! Attempts are signed integers: positive values are hundredths of a second,
//! or hundredths of a move for fewest moves. Negative values are penalties.

/// Did not finish.
pub const DNF: i32 = -1;

/// Did not start.
pub const DNS: i32 = -2;

/// Slot that was never attempted (cut-off rounds, bare padding).
pub const NOT_ATTEMPTED: i32 = 0;

/// Returns true for values that represent an actual attempt (including penalties).
#[must_use]
pub const fn is_attempted(value: i32) -> bool {
    value != NOT_ATTEMPTED
}

/// Returns true for DNF/DNS and any other penalty value.
#[must_use]
pub const fn is_penalty(value: i32) -> bool {
    value < 0
}

/// Formats a result as a clock time, e.g. `550 -> "5.50"`, `6543 -> "1:05.43"`.
#[must_use]
pub fn format_clock(centiseconds: i32) -> String {
    match centiseconds {
        DNS => return "DNS".to_string(),
        v if v < 0 => return "DNF".to_string(),
        _ => {}
    }

    let hours = centiseconds / 360_000;
    let minutes = (centiseconds / 6_000) % 60;
    let seconds = (centiseconds / 100) % 60;
    let hundredths = centiseconds % 100;

    let full = format!("{hours:02}:{minutes:02}:{seconds:02}.{hundredths:02}");
    let trimmed = full.trim_start_matches(|c| c == '0' || c == ':');
    if trimmed.starts_with('.') {
        format!("0{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Formats a fewest moves result (hundredths of a move).
///
/// Means of three end in `.33`/`.67` but are stored truncated (`30`/`60`).
#[must_use]
pub fn format_fewest_moves(result: i32) -> String {
    match result {
        DNS => return "DNS".to_string(),
        v if v < 0 => return "DNF".to_string(),
        _ => {}
    }

    let adjusted = match result % 100 {
        30 => result + 3,
        60 => result + 7,
        _ => result,
    };
    format!("{}", f64::from(adjusted) / 100.0)
}

/// Formats a result for display according to the event kind.
#[must_use]
pub fn format_result(value: i32, fewest_moves: bool) -> String {
    if fewest_moves {
        format_fewest_moves(value)
    } else {
        format_clock(value)
    }
}
