use once_cell::sync::Lazy;
use regex::Regex;

/// Marker git writes into a commit message for `cherry-pick -x`. A commit that
/// was picked repeatedly carries one marker per hop.
static CHERRY_PICK_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(cherry picked from commit ([0-9a-f]{7,64})\)").expect("static regex")
});

/// All provenance shas named by cherry-pick markers in a commit message, in
/// order of appearance.
pub fn cherry_picked_from(message: &str) -> Vec<String> {
    CHERRY_PICK_MARKER
        .captures_iter(message)
        .map(|captures| captures[1].to_string())
        .collect()
}
