//! Root and prune patterns plus usage tracking.
//!
//! A pattern is `*`, a dotted name (package, type or nested type), or
//! `Type#member`. It matches an identifier equal to it or nested under
//! it: `acme` matches `acme.User` and `acme.User#name`; `acme.User`
//! matches `acme.User.Address` and `acme.User#name`. For extension
//! members, whose member part is itself a qualified name, the pattern may
//! also match through that name (`acme` matches
//! `google.protobuf.FieldOptions#acme.redacted`).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::ProtoType;

pub const WILDCARD: &str = "*";

static PATTERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*(#[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*)?$")
        .unwrap()
});

/// `*`, a dotted name, or a dotted name followed by `#member`.
pub fn is_valid_pattern(pattern: &str) -> bool {
    pattern == WILDCARD || PATTERN_RE.is_match(pattern)
}

/// `pattern` equals `name` or is a dotted ancestor of it.
fn is_dotted_prefix(pattern: &str, name: &str) -> bool {
    name == pattern || (name.starts_with(pattern) && name[pattern.len()..].starts_with('.'))
}

/// Whether `pattern` matches `identifier` (`Type` or `Type#member`).
pub fn pattern_matches(pattern: &str, identifier: &str) -> bool {
    if pattern == WILDCARD || pattern == identifier {
        return true;
    }
    match identifier.split_once('#') {
        Some((ty, member)) => {
            is_dotted_prefix(pattern, ty) || (member.contains('.') && is_dotted_prefix(pattern, member))
        }
        None => is_dotted_prefix(pattern, identifier),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PruningRules {
    roots: BTreeSet<String>,
    prunes: BTreeSet<String>,
    upstream: BTreeSet<ProtoType>,
    used_roots: BTreeSet<String>,
    used_prunes: BTreeSet<String>,
}

impl Default for PruningRules {
    fn default() -> Self {
        Self {
            roots: BTreeSet::from([WILDCARD.to_string()]),
            prunes: BTreeSet::new(),
            upstream: BTreeSet::new(),
            used_roots: BTreeSet::new(),
            used_prunes: BTreeSet::new(),
        }
    }
}

impl PruningRules {
    pub fn builder() -> PruningRulesBuilder {
        PruningRulesBuilder::default()
    }

    /// Rules from plain pattern lists. Empty `roots` means everything.
    pub fn new<R, P>(roots: R, prunes: P) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self::builder().add_roots(roots).add_prunes(prunes).build()
    }

    pub fn roots(&self) -> &BTreeSet<String> {
        &self.roots
    }

    pub fn prunes(&self) -> &BTreeSet<String> {
        &self.prunes
    }

    /// Types owned by a module upstream: excluded from the closure like
    /// prunes, but fields pointing at them survive and they are never
    /// reported as unused.
    pub fn upstream(&self) -> &BTreeSet<ProtoType> {
        &self.upstream
    }

    /// True when these rules keep everything.
    pub fn is_identity(&self) -> bool {
        self.roots.len() == 1
            && self.roots.contains(WILDCARD)
            && self.prunes.is_empty()
            && self.upstream.is_empty()
    }

    pub fn is_root(&self, identifier: &str) -> bool {
        self.roots.iter().any(|p| pattern_matches(p, identifier))
    }

    pub fn is_prune(&self, identifier: &str) -> bool {
        self.prunes.iter().any(|p| pattern_matches(p, identifier))
    }

    pub fn is_upstream(&self, ty: &ProtoType) -> bool {
        self.upstream.contains(ty)
    }

    pub(crate) fn matching_roots<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a String> {
        self.roots.iter().filter(move |p| pattern_matches(p, identifier))
    }

    pub(crate) fn matching_prunes<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a String> {
        self.prunes.iter().filter(move |p| pattern_matches(p, identifier))
    }

    /// Copy of these rules carrying the patterns a pruning pass used.
    pub(crate) fn with_usage(&self, used_roots: BTreeSet<String>, used_prunes: BTreeSet<String>) -> Self {
        Self {
            used_roots,
            used_prunes,
            ..self.clone()
        }
    }

    /// Root patterns that matched nothing in the last pruning pass.
    pub fn unused_roots(&self) -> Vec<String> {
        self.roots.difference(&self.used_roots).cloned().collect()
    }

    /// Prune patterns that excluded nothing in the last pruning pass.
    pub fn unused_prunes(&self) -> Vec<String> {
        self.prunes.difference(&self.used_prunes).cloned().collect()
    }
}

#[derive(Debug, Default)]
pub struct PruningRulesBuilder {
    roots: BTreeSet<String>,
    prunes: BTreeSet<String>,
    upstream: BTreeSet<ProtoType>,
}

impl PruningRulesBuilder {
    pub fn add_root(mut self, pattern: impl Into<String>) -> Self {
        self.roots.insert(pattern.into());
        self
    }

    pub fn add_roots<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.roots.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn prune(mut self, pattern: impl Into<String>) -> Self {
        self.prunes.insert(pattern.into());
        self
    }

    pub fn add_prunes<I>(mut self, patterns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.prunes.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn upstream(mut self, types: impl IntoIterator<Item = ProtoType>) -> Self {
        self.upstream.extend(types);
        self
    }

    pub fn build(self) -> PruningRules {
        let roots = if self.roots.is_empty() {
            BTreeSet::from([WILDCARD.to_string()])
        } else {
            self.roots
        };
        PruningRules {
            roots,
            prunes: self.prunes,
            upstream: self.upstream,
            used_roots: BTreeSet::new(),
            used_prunes: BTreeSet::new(),
        }
    }
}
