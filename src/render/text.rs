//! # Message Text Shaping
//!
//! Character-level rules applied before anything is drawn:
//!
//! 1. [`truncate_message`] caps the message length.
//! 2. [`wrap_text`] word-wraps into short lines.
//! 3. [`limit_lines`] caps the line count.
//!
//! All counts are in Unicode scalar values (`char`s), never bytes, so
//! multi-byte text is never split inside a character.

/// Marker appended wherever text was cut short.
pub const ELLIPSIS: &str = "...";

const ELLIPSIS_LEN: usize = 3;

/// Truncate `message` to at most `max_chars` characters.
///
/// Messages over the limit keep their first `max_chars - 3` characters and
/// gain a trailing `"..."`, so the result is exactly `max_chars` long.
///
/// ```
/// use ntfy_printer::render::text::truncate_message;
///
/// assert_eq!(truncate_message("short", 300), "short");
/// assert_eq!(truncate_message("abcdefghij", 8), "abcde...");
/// ```
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS_LEN);
    let mut out: String = message.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Greedy word wrap at `width` characters.
///
/// Words are separated by any whitespace, which collapses. A word longer
/// than `width` is broken into `width`-sized pieces. Empty or
/// whitespace-only input produces no lines.
///
/// ```
/// use ntfy_printer::render::text::wrap_text;
///
/// assert_eq!(wrap_text("Lunch Time!", 10), vec!["Lunch", "Time!"]);
/// assert_eq!(wrap_text("abcdefghijkl", 5), vec!["abcde", "fghij", "kl"]);
/// ```
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();

        // Break over-long words, filling the current line first
        while chars.len() > width {
            let room = if current_len == 0 {
                width
            } else {
                width.saturating_sub(current_len + 1)
            };
            if room == 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            if current_len > 0 {
                current.push(' ');
            }
            current.extend(chars.drain(..room));
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        let word_len = chars.len();
        if word_len == 0 {
            continue;
        }
        if current_len == 0 {
            current.extend(chars);
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.extend(chars);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.extend(chars);
            current_len = word_len;
        }
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Keep at most `max_lines` lines.
///
/// When lines are dropped, the last kept line has its final 3 characters
/// replaced with `"..."`. A kept line shorter than 3 characters becomes
/// `"..."` outright.
pub fn limit_lines(mut lines: Vec<String>, max_lines: usize) -> Vec<String> {
    if lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        let keep = last.chars().count().saturating_sub(ELLIPSIS_LEN);
        let mut marked: String = last.chars().take(keep).collect();
        marked.push_str(ELLIPSIS);
        *last = marked;
    }
    lines
}
