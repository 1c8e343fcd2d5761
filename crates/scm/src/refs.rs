use serde::{Deserialize, Serialize};

/// A ref as advertised by the remote: full name plus target sha.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRefKind {
    Head,
    Merge,
}

/// Structured form of a remote ref name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRef {
    Branch(String),
    Tag(String),
    Pull { number: i64, kind: PullRefKind },
}

/// Parse a fully qualified ref name. Returns `None` for names outside the
/// three namespaces we mirror, and for malformed pull refs.
pub fn parse_ref_name(name: &str) -> Option<ParsedRef> {
    if let Some(branch) = name.strip_prefix("refs/heads/") {
        if branch.is_empty() {
            return None;
        }
        return Some(ParsedRef::Branch(branch.to_string()));
    }
    if let Some(tag) = name.strip_prefix("refs/tags/") {
        if tag.is_empty() {
            return None;
        }
        return Some(ParsedRef::Tag(tag.to_string()));
    }
    if let Some(rest) = name.strip_prefix("refs/pull/") {
        let (number, kind) = rest.split_once('/')?;
        let number: i64 = number.parse().ok()?;
        if number <= 0 {
            return None;
        }
        let kind = match kind {
            "head" => PullRefKind::Head,
            "merge" => PullRefKind::Merge,
            _ => return None,
        };
        return Some(ParsedRef::Pull { number, kind });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_branches_and_tags() {
        assert_eq!(
            parse_ref_name("refs/heads/main"),
            Some(ParsedRef::Branch("main".to_string()))
        );
        assert_eq!(
            parse_ref_name("refs/heads/release/1.x"),
            Some(ParsedRef::Branch("release/1.x".to_string()))
        );
        assert_eq!(
            parse_ref_name("refs/tags/v1.2.3"),
            Some(ParsedRef::Tag("v1.2.3".to_string()))
        );
    }

    #[test]
    fn parses_pull_refs() {
        assert_eq!(
            parse_ref_name("refs/pull/42/head"),
            Some(ParsedRef::Pull {
                number: 42,
                kind: PullRefKind::Head
            })
        );
        assert_eq!(
            parse_ref_name("refs/pull/42/merge"),
            Some(ParsedRef::Pull {
                number: 42,
                kind: PullRefKind::Merge
            })
        );
    }

    #[test]
    fn rejects_foreign_and_malformed_names() {
        assert_eq!(parse_ref_name("refs/notes/commits"), None);
        assert_eq!(parse_ref_name("refs/heads/"), None);
        assert_eq!(parse_ref_name("refs/pull/42"), None);
        assert_eq!(parse_ref_name("refs/pull/42/review"), None);
        assert_eq!(parse_ref_name("refs/pull/-1/head"), None);
        assert_eq!(parse_ref_name("refs/pull/abc/head"), None);
        assert_eq!(parse_ref_name("HEAD"), None);
    }
}
