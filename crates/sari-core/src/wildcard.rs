use crate::error::{Result, SariError};
use globset::{Glob, GlobMatcher};

/// True when `pattern` contains glob metacharacters.
pub fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Resolve a database reference against the known identifiers.
///
/// A glob pattern filters `universe` keeping its order; anything else is an
/// exact reference. An empty result means "no match" and is left to the
/// caller to report.
pub fn expand<S: AsRef<str>>(pattern: &str, universe: &[S]) -> Result<Vec<String>> {
    if !has_magic(pattern) {
        return Ok(universe
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| *name == pattern)
            .take(1)
            .map(str::to_string)
            .collect());
    }
    let matcher = compile(pattern)?;
    Ok(universe
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| matcher.is_match(name))
        .map(str::to_string)
        .collect())
}

/// `*` crosses `/`, so "*" matches "region/name".
fn compile(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| SariError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.kind().to_string(),
        })
}
