//! JSON pointer helpers (RFC 6901).

use crate::PatchError;

/// Escape a single path segment
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Reverse of [`escape_segment`]
pub fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Split a pointer into unescaped segments. The empty pointer is the root.
pub fn parse_pointer(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }

    match pointer.strip_prefix('/') {
        Some(rest) => Ok(rest.split('/').map(unescape_segment).collect()),
        None => Err(PatchError::InvalidPointer(pointer.to_string())),
    }
}

/// Build a pointer from unescaped segments
pub fn format_pointer<S: AsRef<str>>(segments: &[S]) -> String {
    let mut pointer = String::with_capacity(segments.len() * 8);
    for segment in segments {
        pointer.push('/');
        pointer.push_str(&escape_segment(segment.as_ref()));
    }
    pointer
}

/// Append one unescaped segment to an existing pointer
pub fn join_pointer(base: &str, segment: &str) -> String {
    format!("{}/{}", base, escape_segment(segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_root_pointer() {
        assert!(parse_pointer("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_escaped_segments() {
        let segments = parse_pointer("/tiles/a~1b/content/x~0y").unwrap();
        assert_eq!(segments, vec!["tiles", "a/b", "content", "x~y"]);
    }

    #[test]
    fn test_pointer_requires_leading_slash() {
        assert_eq!(
            parse_pointer("tiles/a"),
            Err(PatchError::InvalidPointer("tiles/a".to_string()))
        );
    }

    #[test]
    fn test_format_and_join() {
        let pointer = format_pointer(&["sharedModelMap", "data/set"]);
        assert_eq!(pointer, "/sharedModelMap/data~1set");
        assert_eq!(join_pointer(&pointer, "sharedModel"), "/sharedModelMap/data~1set/sharedModel");
    }
}
