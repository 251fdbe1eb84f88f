//! Person and location entities derived from fact records.

use std::fmt;

use arbor_tree::Fact;
use arbor_tree::fact::is_unknown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Person,
    Location,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Location => "Location",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    /// `kind_name`, lowercased with spaces replaced by underscores.
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
}

impl Entity {
    #[must_use]
    pub fn new(kind: EntityKind, name: &str) -> Self {
        let name = name.trim().to_owned();
        let id = format!("{kind}_{name}").replace(' ', "_").to_lowercase();
        Self { id, name, kind }
    }
}

/// Entities a fact mentions: its `who` as a person and its `where` as a location,
/// skipping placeholder values.
#[must_use]
pub fn extract_entities(fact: &Fact) -> Vec<Entity> {
    let mut out = Vec::with_capacity(2);
    if !is_unknown(&fact.who) {
        out.push(Entity::new(EntityKind::Person, &fact.who));
    }
    if !is_unknown(&fact.location) {
        out.push(Entity::new(EntityKind::Location, &fact.location));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_normalized() {
        let e = Entity::new(EntityKind::Person, " Ahmad Hassan ");
        assert_eq!(e.id, "person_ahmad_hassan");
        assert_eq!(e.name, "Ahmad Hassan");
    }

    #[test]
    fn same_name_different_kind_differs() {
        let p = Entity::new(EntityKind::Person, "Jordan");
        let l = Entity::new(EntityKind::Location, "Jordan");
        assert_ne!(p.id, l.id);
    }

    #[test]
    fn extracts_person_and_location() {
        let fact = Fact::new("Dana", "met", "Monday", "Green Mosque");
        let ents = extract_entities(&fact);
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].kind, EntityKind::Person);
        assert_eq!(ents[1].id, "location_green_mosque");
    }

    #[test]
    fn skips_unknown_case_insensitively() {
        let fact = Fact::new("UNKNOWN", "met", "Monday", "Unknown");
        assert!(extract_entities(&fact).is_empty());
        let fact = Fact::new("Dana", "met", "Monday", "unknown");
        assert_eq!(extract_entities(&fact).len(), 1);
    }
}
