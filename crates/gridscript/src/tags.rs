use std::collections::BTreeMap;

use crate::typeexp::{TagVariant, TypeExp};

/// A tagged type as registered with the host: its name and declared
/// variants, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTypeDef {
    pub name: String,
    pub variants: Vec<TagVariant>,
}

impl TaggedTypeDef {
    pub fn variant(&self, tag_name: &str) -> Option<&TagVariant> {
        self.variants.iter().find(|v| v.name == tag_name)
    }

    pub fn as_type(&self) -> TypeExp {
        TypeExp::Tagged {
            name: self.name.clone(),
            variants: self.variants.clone(),
        }
    }
}

/// Resolution of tagged-type names, consumed by checking and evaluation.
pub trait TypeLookup {
    fn lookup_tag(&self, type_name: &str) -> Option<TaggedTypeDef>;
}

/// In-memory registry of tagged types.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TaggedTypeDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: TaggedTypeDef) {
        self.types.insert(def.name.clone(), def);
    }
}

impl TypeLookup for TypeRegistry {
    fn lookup_tag(&self, type_name: &str) -> Option<TaggedTypeDef> {
        self.types.get(type_name).cloned()
    }
}
