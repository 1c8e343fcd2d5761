use db::types::ChangeKind;
use semver::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum BumpLevel {
    Patch,
    Minor,
    Major,
}

fn level_for(kind: ChangeKind) -> Option<BumpLevel> {
    match kind {
        ChangeKind::Breaking => Some(BumpLevel::Major),
        ChangeKind::Feat | ChangeKind::Refactor => Some(BumpLevel::Minor),
        ChangeKind::Fix | ChangeKind::Perf => Some(BumpLevel::Patch),
        ChangeKind::Docs | ChangeKind::Chore => None,
    }
}

/// Map a change set to the next version. `None` means no release is due.
/// A first release is always 1.0.0, whatever triggered it.
pub fn bump(current: Option<&Version>, changes: &[ChangeKind]) -> Option<Version> {
    let level = changes.iter().copied().filter_map(level_for).max()?;
    let next = match current {
        None => Version::new(1, 0, 0),
        Some(version) => match level {
            BumpLevel::Major => Version::new(version.major + 1, 0, 0),
            BumpLevel::Minor => Version::new(version.major, version.minor + 1, 0),
            BumpLevel::Patch => Version::new(version.major, version.minor, version.patch + 1),
        },
    };
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(raw: &str) -> Version {
        Version::parse(raw).expect("valid semver")
    }

    #[test]
    fn empty_change_set_means_no_release() {
        assert_eq!(bump(None, &[]), None);
        assert_eq!(bump(Some(&version("1.2.3")), &[]), None);
    }

    #[test]
    fn non_releasing_kinds_mean_no_release() {
        let changes = [ChangeKind::Docs, ChangeKind::Chore];
        assert_eq!(bump(Some(&version("1.2.3")), &changes), None);
    }

    #[test]
    fn each_level_bumps_its_component() {
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Fix]),
            Some(version("1.2.4"))
        );
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Perf]),
            Some(version("1.2.4"))
        );
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Feat]),
            Some(version("1.3.0"))
        );
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Refactor]),
            Some(version("1.3.0"))
        );
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Breaking]),
            Some(version("2.0.0"))
        );
    }

    #[test]
    fn highest_priority_kind_wins_regardless_of_order() {
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Feat, ChangeKind::Breaking]),
            Some(version("2.0.0"))
        );
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Breaking, ChangeKind::Feat]),
            Some(version("2.0.0"))
        );
        assert_eq!(
            bump(Some(&version("1.2.3")), &[ChangeKind::Fix, ChangeKind::Feat]),
            Some(version("1.3.0"))
        );
    }

    #[test]
    fn first_release_is_one_oh_oh() {
        assert_eq!(bump(None, &[ChangeKind::Breaking]), Some(version("1.0.0")));
        assert_eq!(bump(None, &[ChangeKind::Fix]), Some(version("1.0.0")));
    }
}
