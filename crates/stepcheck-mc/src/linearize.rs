//! Heap linearization: turning an execution state into a [`Fingerprint`].
//!
//! Objects are renamed to virtual ids in the order they are first reached, so
//! the result does not depend on raw object identities. An object reached a
//! second time is emitted as its negated virtual id and not descended into,
//! which makes cyclic graphs finite.
//!
//! Layout of an object: virtual id, virtual class id, then its fields from the
//! most derived class towards the root class, or for arrays the length and
//! then every element. Primitives widen to one word; `long` and `double` emit
//! the high word and then the low word.
//!
//! The traversal keeps an explicit work stack. Children are pushed in reverse
//! so the emitted order is that of a depth-first recursive walk.

use crate::fingerprint::Fingerprint;
use std::collections::{BTreeMap, HashMap};
use stepcheck_state::{
    ArrayData, ClassId, ClassInfo, ClassKind, ClassTable, ExecutionState, FieldInfo, FieldKind,
    HeapObject, ObjectBody, ObjectId, Primitive, PrimitiveKind, Slot, ThreadStatus,
};
use thiserror::Error;

/// Emitted for a null reference or an absent value.
pub const NULL_REF: i32 = -999;
/// The first object gets `OBJECT_ID_BASE + 1`.
pub const OBJECT_ID_BASE: i32 = 5000;
pub const CLASS_ID_BASE: i32 = 6000;
pub const METHOD_ID_BASE: i32 = 7000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinearizeError {
    #[error("linearization of '{category}' values is not implemented")]
    UnsupportedFieldType { category: String },

    #[error("dangling reference to {object}")]
    DanglingReference { object: ObjectId },

    #[error("unknown class {class}")]
    UnknownClass { class: ClassId },

    #[error("'{class}.{field}' holds a value that does not match its declared type")]
    LayoutMismatch { class: String, field: String },
}

type Result<T> = std::result::Result<T, LinearizeError>;

/// Field exclusion patterns.
///
/// A pattern is `Class.field` or a bare `field`; either form may end in `*`
/// to match by prefix. `Class` names the class that declares the field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldFilter {
    patterns: Vec<Pattern>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Pattern {
    class: Option<String>,
    field: String,
    prefix: bool,
}

impl Pattern {
    fn parse(text: &str) -> Self {
        let (text, prefix) = match text.strip_suffix('*') {
            Some(stem) => (stem, true),
            None => (text, false),
        };
        match text.rsplit_once('.') {
            Some((class, field)) => Pattern {
                class: Some(class.to_string()),
                field: field.to_string(),
                prefix,
            },
            None => Pattern {
                class: None,
                field: text.to_string(),
                prefix,
            },
        }
    }

    fn matches(&self, class: &str, field: &str) -> bool {
        if self.class.as_deref().is_some_and(|c| c != class) {
            return false;
        }
        if self.prefix {
            field.starts_with(&self.field)
        } else {
            field == self.field
        }
    }
}

impl FieldFilter {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| Pattern::parse(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_excluded(&self, class: &str, field: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(class, field))
    }
}

enum Task<'h> {
    Reference(Option<ObjectId>),
    Value(&'h Primitive),
}

/// One linearization. All renaming tables live here and are discarded with
/// it, so independent computations never share numbering.
pub struct Linearizer<'a> {
    classes: &'a ClassTable,
    filter: &'a FieldFilter,
    objects: HashMap<ObjectId, i32>,
    class_ids: HashMap<ClassId, i32>,
    methods: HashMap<&'a str, i32>,
    stack: Vec<Task<'a>>,
    words: Vec<i32>,
}

impl<'a> Linearizer<'a> {
    pub fn new(classes: &'a ClassTable, filter: &'a FieldFilter) -> Self {
        Self {
            classes,
            filter,
            objects: HashMap::new(),
            class_ids: HashMap::new(),
            methods: HashMap::new(),
            stack: Vec::new(),
            words: Vec::new(),
        }
    }

    /// Linearize the object graph reachable from `root`.
    pub fn linearize_object(
        mut self,
        heap: &'a BTreeMap<ObjectId, HeapObject>,
        root: Option<ObjectId>,
    ) -> Result<Fingerprint> {
        self.reference(heap, root)?;
        Ok(Fingerprint::new(self.words))
    }

    /// Linearize a whole state: threads in id order, then globals in name
    /// order, then the monitors of reachable objects.
    ///
    /// Class ids follow the class table rather than first sight, so the same
    /// class gets the same word in every state of a run.
    pub fn linearize_state(mut self, state: &'a ExecutionState) -> Result<Fingerprint> {
        let heap = &state.heap;
        let classes = self.classes;
        for info in classes.iter() {
            self.class_id(info.id);
        }

        self.words.push(state.threads.len() as i32);
        self.words
            .push(state.active.map_or(NULL_REF, |t| t.as_u32() as i32));

        for thread in state.threads.values() {
            self.words.push(thread.id.as_u32() as i32);
            self.words.push(status_tag(thread.status));
            if let Some(on) = thread.status.lock_target() {
                self.reference(heap, Some(on))?;
            }
            self.words.push(thread.saved_lock_count as i32);
            self.words.push(thread.frames.len() as i32);
            for frame in &thread.frames {
                let method = self.method_id(&frame.method);
                self.words.push(method);
                self.words.push(frame.pc as i32);
                self.words.push(frame.locals.len() as i32);
                for local in &frame.locals {
                    self.tagged_slot(heap, local)?;
                }
            }
        }

        self.words.push(state.globals.len() as i32);
        for slot in state.globals.values() {
            self.tagged_slot(heap, slot)?;
        }

        let mut locks: Vec<_> = state
            .locks
            .iter()
            .filter(|(_, lock)| !lock.is_trivial())
            .filter_map(|(obj, lock)| self.objects.get(obj).map(|vid| (*vid, lock)))
            .collect();
        locks.sort_unstable_by_key(|(vid, _)| *vid);
        self.words.push(locks.len() as i32);
        for (vid, lock) in locks {
            self.words.push(vid);
            self.words
                .push(lock.owner().map_or(NULL_REF, |t| t.as_u32() as i32));
            self.words.push(lock.hold_count() as i32);
            self.words.push(lock.waiters().len() as i32);
            self.words
                .extend(lock.waiters().iter().map(|t| t.as_u32() as i32));
        }

        Ok(Fingerprint::new(self.words))
    }

    fn method_id(&mut self, method: &'a str) -> i32 {
        let next = METHOD_ID_BASE + self.methods.len() as i32 + 1;
        *self.methods.entry(method).or_insert(next)
    }

    fn class_id(&mut self, class: ClassId) -> i32 {
        let next = CLASS_ID_BASE + self.class_ids.len() as i32 + 1;
        *self.class_ids.entry(class).or_insert(next)
    }

    fn tagged_slot(
        &mut self,
        heap: &'a BTreeMap<ObjectId, HeapObject>,
        slot: &'a Slot,
    ) -> Result<()> {
        match slot {
            Slot::Ref(r) => {
                self.words.push(0);
                self.reference(heap, *r)
            }
            Slot::Prim(p) => {
                self.words.push(primitive_tag(p)?);
                self.primitive(p)
            }
        }
    }

    /// Emit the graph reachable from `root`.
    fn reference(
        &mut self,
        heap: &'a BTreeMap<ObjectId, HeapObject>,
        root: Option<ObjectId>,
    ) -> Result<()> {
        let classes = self.classes;
        debug_assert!(self.stack.is_empty());
        self.stack.push(Task::Reference(root));

        while let Some(task) = self.stack.pop() {
            let id = match task {
                Task::Value(p) => {
                    self.primitive(p)?;
                    continue;
                }
                Task::Reference(None) => {
                    self.words.push(NULL_REF);
                    continue;
                }
                Task::Reference(Some(id)) => id,
            };
            if let Some(vid) = self.objects.get(&id) {
                self.words.push(-vid);
                continue;
            }
            let obj = heap
                .get(&id)
                .ok_or(LinearizeError::DanglingReference { object: id })?;
            let vid = OBJECT_ID_BASE + self.objects.len() as i32 + 1;
            self.objects.insert(id, vid);
            self.words.push(vid);
            let cid = self.class_id(obj.class);
            self.words.push(cid);

            let info = classes
                .get(obj.class)
                .ok_or(LinearizeError::UnknownClass { class: obj.class })?;
            let mark = self.stack.len();
            match (&obj.body, &info.kind) {
                (ObjectBody::Fields(fields), ClassKind::Instance) => {
                    self.push_fields(info, fields)?;
                }
                (ObjectBody::Array(data), ClassKind::Array(elem)) => {
                    self.words.push(data.len() as i32);
                    self.push_elements(info, elem, data)?;
                }
                _ => {
                    return Err(LinearizeError::LayoutMismatch {
                        class: info.name.clone(),
                        field: "<body>".to_string(),
                    })
                }
            }
            self.stack[mark..].reverse();
        }
        Ok(())
    }

    fn push_fields(&mut self, info: &ClassInfo, fields: &'a [Slot]) -> Result<()> {
        let classes = self.classes;
        if fields.len() != info.instance_size() {
            return Err(LinearizeError::LayoutMismatch {
                class: info.name.clone(),
                field: "<layout>".to_string(),
            });
        }
        for class in classes.hierarchy(info.id) {
            for (i, field) in class.declared_fields().iter().enumerate() {
                if self.filter.is_excluded(&class.name, &field.name) {
                    continue;
                }
                let task = field_task(class, field, &fields[class.base_offset() + i])?;
                self.stack.push(task);
            }
        }
        Ok(())
    }

    fn push_elements(&mut self, info: &ClassInfo, elem: &FieldKind, data: &'a ArrayData) -> Result<()> {
        let mismatch = || LinearizeError::LayoutMismatch {
            class: info.name.clone(),
            field: "[]".to_string(),
        };
        match (data, elem) {
            (ArrayData::Reference(refs), FieldKind::Reference) => {
                self.stack.extend(refs.iter().map(|r| Task::Reference(*r)));
            }
            (ArrayData::Primitive(values), FieldKind::Primitive(kind)) => {
                for v in values {
                    if v.kind() != Some(*kind) {
                        return Err(mismatch());
                    }
                    self.stack.push(Task::Value(v));
                }
            }
            (ArrayData::Primitive(values), FieldKind::Extension(category)) => {
                if !values.is_empty() {
                    return Err(LinearizeError::UnsupportedFieldType {
                        category: category.to_string(),
                    });
                }
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    fn primitive(&mut self, p: &Primitive) -> Result<()> {
        match p {
            Primitive::Boolean(b) => self.words.push(*b as i32),
            Primitive::Byte(v) => self.words.push(*v as i32),
            Primitive::Char(v) => self.words.push(*v as i32),
            Primitive::Short(v) => self.words.push(*v as i32),
            Primitive::Int(v) => self.words.push(*v),
            Primitive::Long(v) => self.wide(*v as u64),
            Primitive::Float(v) => self.words.push(v.to_bits() as i32),
            Primitive::Double(v) => self.wide(v.to_bits()),
            Primitive::Extension { category, .. } => {
                return Err(LinearizeError::UnsupportedFieldType {
                    category: category.to_string(),
                })
            }
        }
        Ok(())
    }

    fn wide(&mut self, bits: u64) {
        self.words.push((bits >> 32) as u32 as i32);
        self.words.push(bits as u32 as i32);
    }
}

fn field_task<'h>(class: &ClassInfo, field: &FieldInfo, slot: &'h Slot) -> Result<Task<'h>> {
    match (&field.kind, slot) {
        (FieldKind::Reference, Slot::Ref(r)) => Ok(Task::Reference(*r)),
        (FieldKind::Primitive(kind), Slot::Prim(p)) if p.kind() == Some(*kind) => Ok(Task::Value(p)),
        (FieldKind::Extension(category), _) => Err(LinearizeError::UnsupportedFieldType {
            category: category.to_string(),
        }),
        _ => Err(LinearizeError::LayoutMismatch {
            class: class.name.clone(),
            field: field.name.clone(),
        }),
    }
}

/// Tag word preceding a local or global value.
fn primitive_tag(p: &Primitive) -> Result<i32> {
    Ok(match p.kind() {
        Some(PrimitiveKind::Boolean) => 1,
        Some(PrimitiveKind::Byte) => 2,
        Some(PrimitiveKind::Char) => 3,
        Some(PrimitiveKind::Short) => 4,
        Some(PrimitiveKind::Int) => 5,
        Some(PrimitiveKind::Long) => 6,
        Some(PrimitiveKind::Float) => 7,
        Some(PrimitiveKind::Double) => 8,
        None => {
            let category = match p {
                Primitive::Extension { category, .. } => category.to_string(),
                _ => String::new(),
            };
            return Err(LinearizeError::UnsupportedFieldType { category });
        }
    })
}

fn status_tag(status: ThreadStatus) -> i32 {
    match status {
        ThreadStatus::Runnable => 0,
        ThreadStatus::Blocked { .. } => 1,
        ThreadStatus::Waiting { .. } => 2,
        ThreadStatus::Notified { .. } => 3,
        ThreadStatus::Terminated => 4,
    }
}

/// Fingerprint of a whole state.
pub fn linearize_state(
    classes: &ClassTable,
    filter: &FieldFilter,
    state: &ExecutionState,
) -> Result<Fingerprint> {
    Linearizer::new(classes, filter).linearize_state(state)
}
