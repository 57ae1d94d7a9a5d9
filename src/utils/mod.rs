pub mod logging;

pub use logging::init_tracing;

use unicode_normalization::UnicodeNormalization;

/// NFKC-normalizes `text` and folds the rest to ASCII: accented letters keep their base
/// letter, characters without an ASCII base are dropped.
fn fold_to_ascii(text: &str) -> String {
    text.nfkc()
        .filter_map(|c| {
            if c.is_ascii() {
                Some(c)
            } else {
                std::iter::once(c).nfd().find(|part| part.is_ascii())
            }
        })
        .collect()
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    let replaced: String = fold_to_ascii(filename)
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Human readable `h:mm:ss` / `m:ss` for a cloudcast length.
pub fn format_duration(duration: std::time::Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}
