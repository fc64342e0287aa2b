//! Statement text normalization for audit records.

/// Default cap on embedded statement length, in characters.
pub const DEFAULT_MAX_STATEMENT_LENGTH: usize = 2048;

/// Appended to statements that were cut short.
pub const TRUNCATION_MARKER: &str = "...";

/// Collapse whitespace runs to single spaces and cap the length.
///
/// Statements longer than `max_len` characters keep their first `max_len`
/// characters followed by [`TRUNCATION_MARKER`].
pub fn normalize_statement(sql: &str, max_len: usize) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_len {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(max_len).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
