//! Class metadata: field layouts and array element kinds.
//!
//! Instances store inherited fields first. A class records the offset of its
//! first declared field, so the slot of any field is
//! `class.base_offset() + declared_index`.

use crate::error::{StateError, StateResult};
use crate::ids::ClassId;
use crate::value::{Primitive, PrimitiveKind, Slot};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Declared type of a field or array element.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Primitive(PrimitiveKind),
    /// A user-defined primitive category.
    Extension(Arc<str>),
    Reference,
}

impl FieldKind {
    /// The value a freshly allocated field or element of this kind holds.
    pub fn default_slot(&self) -> Slot {
        match self {
            FieldKind::Primitive(kind) => Slot::Prim(kind.default_value()),
            FieldKind::Extension(category) => Slot::Prim(Primitive::Extension {
                category: category.clone(),
                bits: 0,
            }),
            FieldKind::Reference => Slot::NULL,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Primitive(kind) => write!(f, "{}", kind),
            FieldKind::Extension(category) => write!(f, "{}", category),
            FieldKind::Reference => f.write_str("ref"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn primitive(name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self::new(name, FieldKind::Primitive(kind))
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Reference)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Instance,
    /// Array class with the given element kind. Arrays of arrays use
    /// `FieldKind::Reference` elements.
    Array(FieldKind),
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub superclass: Option<ClassId>,
    pub kind: ClassKind,
    declared: Vec<FieldInfo>,
    base_offset: usize,
}

impl ClassInfo {
    /// Fields declared by this class itself, in declaration order.
    pub fn declared_fields(&self) -> &[FieldInfo] {
        &self.declared
    }

    /// Slot index of the first declared field.
    pub fn base_offset(&self) -> usize {
        self.base_offset
    }

    /// Number of field slots an instance of this class occupies.
    pub fn instance_size(&self) -> usize {
        self.base_offset + self.declared.len()
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array(_))
    }

    pub fn element_kind(&self) -> Option<&FieldKind> {
        match &self.kind {
            ClassKind::Array(kind) => Some(kind),
            ClassKind::Instance => None,
        }
    }
}

/// Registry of classes known to one checked program.
///
/// Class ids are dense registration indices, so a superclass always has a
/// smaller id than its subclasses.
#[derive(Clone, Debug, Default)]
pub struct ClassTable {
    classes: Vec<ClassInfo>,
    by_name: HashMap<String, ClassId>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance class. The superclass must already be registered.
    pub fn define_class(
        &mut self,
        name: impl Into<String>,
        superclass: Option<ClassId>,
        fields: Vec<FieldInfo>,
    ) -> StateResult<ClassId> {
        let name = name.into();
        let base_offset = match superclass {
            Some(sup) => {
                let sup = self.get(sup).ok_or(StateError::UnknownClass { class: sup })?;
                if sup.is_array() {
                    return Err(StateError::InvalidSuperclass { name: sup.name.clone() });
                }
                sup.instance_size()
            }
            None => 0,
        };
        self.insert(ClassInfo {
            id: ClassId(0),
            name,
            superclass,
            kind: ClassKind::Instance,
            declared: fields,
            base_offset,
        })
    }

    /// Register an array class, or return the existing one with that name.
    pub fn define_array(&mut self, name: impl Into<String>, element: FieldKind) -> StateResult<ClassId> {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            return match &self.classes[id.index()].kind {
                ClassKind::Array(existing) if *existing == element => Ok(id),
                _ => Err(StateError::DuplicateClass { name }),
            };
        }
        self.insert(ClassInfo {
            id: ClassId(0),
            name,
            superclass: None,
            kind: ClassKind::Array(element),
            declared: Vec::new(),
            base_offset: 0,
        })
    }

    fn insert(&mut self, mut info: ClassInfo) -> StateResult<ClassId> {
        if self.by_name.contains_key(&info.name) {
            return Err(StateError::DuplicateClass { name: info.name });
        }
        let id = ClassId(self.classes.len() as u32);
        info.id = id;
        self.by_name.insert(info.name.clone(), id);
        self.classes.push(info);
        Ok(id)
    }

    #[inline]
    pub fn get(&self, id: ClassId) -> Option<&ClassInfo> {
        self.classes.get(id.index())
    }

    pub fn require(&self, id: ClassId) -> StateResult<&ClassInfo> {
        self.get(id).ok_or(StateError::UnknownClass { class: id })
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.iter()
    }

    /// The class followed by its superclasses, most derived first.
    pub fn hierarchy(&self, id: ClassId) -> Hierarchy<'_> {
        Hierarchy {
            table: self,
            next: Some(id),
        }
    }

    /// Resolve a field by name, searching from `class` towards its
    /// superclasses so that subclass fields shadow inherited ones.
    pub fn resolve_field(&self, class: ClassId, field: &str) -> StateResult<(usize, &FieldInfo)> {
        for info in self.hierarchy(class) {
            if let Some(pos) = info.declared.iter().position(|f| f.name == field) {
                return Ok((info.base_offset + pos, &info.declared[pos]));
            }
        }
        let class_name = self
            .get(class)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| class.to_string());
        Err(StateError::FieldNotFound {
            class: class_name,
            field: field.to_string(),
        })
    }

    /// Default-initialized field slots for a new instance of `class`.
    pub fn new_instance_slots(&self, class: ClassId) -> StateResult<Vec<Slot>> {
        let info = self.require(class)?;
        let mut slots = vec![Slot::NULL; info.instance_size()];
        for c in self.hierarchy(class) {
            for (i, field) in c.declared.iter().enumerate() {
                slots[c.base_offset + i] = field.kind.default_slot();
            }
        }
        Ok(slots)
    }
}

/// Iterator over a class and its superclasses.
pub struct Hierarchy<'a> {
    table: &'a ClassTable,
    next: Option<ClassId>,
}

impl<'a> Iterator for Hierarchy<'a> {
    type Item = &'a ClassInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let info = self.table.get(self.next?)?;
        self.next = info.superclass;
        Some(info)
    }
}
