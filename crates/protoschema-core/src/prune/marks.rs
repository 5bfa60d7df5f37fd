//! The set of types and members a pruning pass retains.

use std::collections::BTreeSet;

use crate::models::{OptionElement, ProtoMember, ProtoType};

/// Retained identifiers. A type is present when it was reached as a whole
/// or when any of its members was; only marked members of a present type
/// survive.
#[derive(Debug, Default, Clone)]
pub struct MarkSet {
    types: BTreeSet<ProtoType>,
    members: BTreeSet<ProtoMember>,
}

impl MarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `ty` was already present.
    pub fn mark_type(&mut self, ty: &ProtoType) -> bool {
        if self.types.contains(ty) {
            return false;
        }
        self.types.insert(ty.clone())
    }

    /// Marks `member` only; callers decide whether its type becomes
    /// present. Returns false if the member was already marked.
    pub fn mark_member(&mut self, member: &ProtoMember) -> bool {
        if self.members.contains(member) {
            return false;
        }
        self.members.insert(member.clone())
    }

    pub fn contains_type(&self, ty: &ProtoType) -> bool {
        self.types.contains(ty)
    }

    pub fn contains_member(&self, member: &ProtoMember) -> bool {
        self.members.contains(member)
    }

    /// Built-in options always survive; custom options survive with their
    /// extension field.
    pub fn retains_option(&self, option: &OptionElement) -> bool {
        option
            .extension
            .as_ref()
            .map_or(true, |member| self.members.contains(member))
    }

    pub fn types(&self) -> impl Iterator<Item = &ProtoType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OptionValue;

    #[test]
    fn members_and_types_are_marked_independently() {
        let mut marks = MarkSet::new();
        let member = ProtoMember::get(ProtoType::get("acme.A"), "b");
        assert!(marks.mark_member(&member));
        assert!(!marks.mark_member(&member));
        assert!(marks.contains_member(&member));
        assert!(!marks.contains_type(&ProtoType::get("acme.A")));
        assert!(marks.mark_type(&ProtoType::get("acme.A")));
        assert!(!marks.mark_type(&ProtoType::get("acme.A")));
        assert_eq!(marks.len(), 1);
    }

    #[test]
    fn custom_options_follow_their_extension() {
        let mut marks = MarkSet::new();
        let extension = ProtoMember::get(ProtoType::get("google.protobuf.FieldOptions"), "acme.redacted");
        let mut option = OptionElement::new("(acme.redacted)", OptionValue::Scalar("true".into()));
        option.extension = Some(extension.clone());
        let builtin = OptionElement::new("deprecated", OptionValue::Scalar("true".into()));

        assert!(!marks.retains_option(&option));
        assert!(marks.retains_option(&builtin));
        marks.mark_member(&extension);
        assert!(marks.retains_option(&option));
    }
}
