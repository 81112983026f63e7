//! Field-name normalization for dynamic (non-strict) entities.

use std::sync::OnceLock;

use regex::Regex;

struct CasePatterns {
    lower_upper: Regex,
    acronym: Regex,
    separators: Regex,
}

impl CasePatterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            lower_upper: Regex::new(r"([a-z0-9])([A-Z])")?,
            acronym: Regex::new(r"([A-Z]+)([A-Z][a-z])")?,
            separators: Regex::new(r"[\s\-]+")?,
        })
    }
}

fn case_patterns() -> Option<&'static CasePatterns> {
    static PATTERNS: OnceLock<Option<CasePatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| CasePatterns::compile().ok())
        .as_ref()
}

/// Convert a field name to snake_case.
///
/// ```
/// use sqlentity_core::naming::snake_case;
///
/// assert_eq!(snake_case("userName"), "user_name");
/// assert_eq!(snake_case("HTTPStatus"), "http_status");
/// assert_eq!(snake_case("already_snake"), "already_snake");
/// ```
pub fn snake_case(name: &str) -> String {
    let Some(patterns) = case_patterns() else {
        return name.trim().to_lowercase();
    };
    let name = patterns.separators.replace_all(name.trim(), "_");
    let name = patterns.acronym.replace_all(&name, "${1}_${2}");
    let name = patterns.lower_upper.replace_all(&name, "${1}_${2}");
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_variants() {
        assert_eq!(snake_case("createTime"), "create_time");
        assert_eq!(snake_case("CreateTime"), "create_time");
        assert_eq!(snake_case("userID"), "user_id");
        assert_eq!(snake_case("user id"), "user_id");
        assert_eq!(snake_case("user-id"), "user_id");
        assert_eq!(snake_case("id"), "id");
        assert_eq!(snake_case("address2Line"), "address2_line");
    }
}
