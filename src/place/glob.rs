//! Place name globs: `*` matches one segment, `**` matches any number.

pub fn is_glob(pattern: &str) -> bool {
    pattern.contains('*')
}

/// True when the dotted `name` matches the dotted `glob`.
pub fn matches(glob: &str, name: &str) -> bool {
    let pattern: Vec<&str> = glob.split('.').collect();
    let segments: Vec<&str> = if name.is_empty() {
        Vec::new()
    } else {
        name.split('.').collect()
    };
    match_segments(&pattern, &segments)
}

fn match_segments(pattern: &[&str], segments: &[&str]) -> bool {
    match pattern.split_first() {
        None => segments.is_empty(),
        Some((&"**", rest)) => (0..=segments.len()).any(|i| match_segments(rest, &segments[i..])),
        Some((&"*", rest)) => !segments.is_empty() && match_segments(rest, &segments[1..]),
        Some((literal, rest)) => {
            segments.first() == Some(literal) && match_segments(rest, &segments[1..])
        }
    }
}
