use std::path::Path;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Splits the payload of a vote: questions are separated by `|`, and the
/// choices of a question by `;`.
///
/// An empty payload is a single blank entry.
pub fn split_answers(payload: &str) -> Vec<Vec<String>> {
    payload
        .split('|')
        .map(|q| {
            q.split(';')
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(|c| c.to_string())
                .collect()
        })
        .collect()
}
