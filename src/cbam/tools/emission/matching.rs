//! Loose name comparison for supplier names typed by hand in different files.

/// Fragments dropped before names are compared. Characters go first so that
/// legal-form tokens are removed from the joined remainder.
const IGNORED_FRAGMENTS: &[&str] = &[
    " ", "\u{a0}", "-", "_", "(", ")", ".", ",", ";", ":", "/", "\\", "co", "ltd", "gmbh",
];

/// Lowercases a name and strips punctuation and legal-form tokens.
pub fn clean_name(name: &str) -> String {
    IGNORED_FRAGMENTS
        .iter()
        .fold(name.to_lowercase(), |acc, fragment| acc.replace(fragment, ""))
}

/// Case-insensitive comparison of trimmed names.
pub fn same_name(lhs: &str, rhs: &str) -> bool {
    lhs.trim().to_lowercase() == rhs.trim().to_lowercase()
}

pub fn similar_name(lhs: &str, rhs: &str) -> bool {
    clean_name(lhs) == clean_name(rhs)
}

/// Name without a trailing parenthetical, e.g. `Plant A (Operator B)` → `Plant A`.
pub fn strip_parenthetical(name: &str) -> Option<&str> {
    let trimmed = name.trim_end();
    if !trimmed.ends_with(')') {
        return None;
    }
    trimmed
        .find('(')
        .map(|open| trimmed[..open].trim_end())
        .filter(|stem| !stem.is_empty())
}

/// How a candidate list matched a wanted name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Similar,
}

/// First exact match, otherwise the first similar match.
pub fn find_name<'a, I>(wanted: &str, candidates: I) -> Option<(&'a str, MatchKind)>
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    candidates
        .clone()
        .into_iter()
        .find(|candidate| same_name(candidate, wanted))
        .map(|candidate| (candidate, MatchKind::Exact))
        .or_else(|| {
            candidates
                .into_iter()
                .find(|candidate| similar_name(candidate, wanted))
                .map(|candidate| (candidate, MatchKind::Similar))
        })
}
