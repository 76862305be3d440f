use crate::types::IdentityRecord;

const RENAMED_EXTENSION: &str = ".jpg";

/// Destination filename for a resolved identity.
///
/// Names of three or more words keep their inner spaces and join the last
/// word with `+`; shorter names replace every space with `+`. The id code
/// follows an underscore. The caller checks for existing files.
pub fn synthesize(record: &IdentityRecord) -> String {
    let words: Vec<&str> = record.full_name.split_whitespace().collect();

    let stem = match words.split_last() {
        Some((last, rest)) if rest.len() >= 2 => format!("{}+{}", rest.join(" "), last),
        _ => record.full_name.replace(' ', "+"),
    };

    format!("{stem}_{}{RENAMED_EXTENSION}", record.id_code)
}
