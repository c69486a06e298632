use globset::GlobBuilder;

/// Case-insensitive shell glob match (`*`, `?`, `[...]`), fnmatch style:
/// `*` also crosses `/`. A pattern that fails to compile matches nothing.
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match GlobBuilder::new(pattern)
        .case_insensitive(true)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
    {
        Ok(glob) => glob.compile_matcher().is_match(value),
        Err(e) => {
            tracing::debug!("ignoring malformed pattern '{}': {}", pattern, e);
            false
        }
    }
}

/// True iff at least one pattern matches `value`.
pub fn any_matches<S: AsRef<str>>(patterns: &[S], value: &str) -> bool {
    patterns.iter().any(|p| matches(p.as_ref(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_case_insensitive() {
        assert!(matches("10DE", "10de"));
        assert!(matches("10de", "10DE"));
        assert!(!matches("10de", "8086"));
    }

    #[test]
    fn test_wildcards() {
        assert!(matches("*", "anything"));
        assert!(matches("03*", "0300"));
        assert!(matches("03?2", "0302"));
        assert!(!matches("03?2", "0300"));
        assert!(matches("legacy-*", "legacy-driver"));
        assert!(matches("video-*", "video-a/b"));
    }

    #[test]
    fn test_character_classes() {
        assert!(matches("030[0-2]", "0301"));
        assert!(!matches("030[0-2]", "0303"));
        assert!(matches("030[!0]", "0302"));
        assert!(matches("1[a-f]de", "1DDE"));
    }

    #[test]
    fn test_malformed_pattern_does_not_match() {
        assert!(!matches("[", "["));
        assert!(!matches("03[", "03"));
    }

    #[test]
    fn test_any_matches() {
        let patterns = vec!["8086".to_string(), "10de".to_string()];
        assert!(any_matches(&patterns, "10DE"));
        assert!(!any_matches(&patterns, "1002"));
        assert!(!any_matches::<String>(&[], "1002"));
    }
}
