//! Relation metadata for entity types.
//!
//! Relations are declared once on the entity type. A relation value lives in
//! the working data under the relation's name; it is never part of the
//! column payload and is only saved or deleted alongside its parent when the
//! instance enrolls it through `together`.

/// The kind of relation held under a field name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One related entity; cascades on save and delete.
    #[default]
    OneToOne,
    /// A collection of related entities; cascades on delete only.
    OneToMany,
}

/// Metadata about one relation of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipInfo {
    /// Name of the relation field in working data.
    pub name: String,

    /// Kind of relation.
    pub kind: RelationshipKind,

    /// Column on the related entity that receives the parent's key.
    pub foreign_key: Option<String>,
}

impl RelationshipInfo {
    /// A one-to-one relation without a foreign key.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: RelationshipKind::OneToOne,
            foreign_key: None,
        }
    }

    /// Set the foreign key column on the related entity.
    #[must_use]
    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    /// Set the relation kind.
    #[must_use]
    pub fn kind(mut self, kind: RelationshipKind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether saving the parent also saves this relation.
    pub fn cascades_on_save(&self) -> bool {
        self.kind == RelationshipKind::OneToOne
    }
}

/// Find a relation by field name.
pub fn find_relationship<'a>(
    relations: &'a [RelationshipInfo],
    name: &str,
) -> Option<&'a RelationshipInfo> {
    relations.iter().find(|r| r.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_info_builder_chain() {
        let info = RelationshipInfo::new("profile").foreign_key("user_id");
        assert_eq!(info.name, "profile");
        assert_eq!(info.kind, RelationshipKind::OneToOne);
        assert_eq!(info.foreign_key.as_deref(), Some("user_id"));
        assert!(info.cascades_on_save());

        let posts = RelationshipInfo::new("posts").kind(RelationshipKind::OneToMany);
        assert!(!posts.cascades_on_save());
        assert_eq!(posts.foreign_key, None);
    }

    #[test]
    fn test_find_relationship() {
        let relations = vec![
            RelationshipInfo::new("profile").foreign_key("user_id"),
            RelationshipInfo::new("avatar").foreign_key("owner_id"),
        ];
        let found = find_relationship(&relations, "avatar").unwrap();
        assert_eq!(found.foreign_key.as_deref(), Some("owner_id"));
        assert!(find_relationship(&relations, "missing").is_none());
    }
}
