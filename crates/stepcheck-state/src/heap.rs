//! Heap objects.

use crate::ids::{ClassId, ObjectId};
use crate::value::{Primitive, Slot};

/// Elements of an array object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayData {
    Primitive(Vec<Primitive>),
    /// Object and sub-array references.
    Reference(Vec<Option<ObjectId>>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Primitive(values) => values.len(),
            ArrayData::Reference(refs) => refs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectBody {
    /// Field slots in layout order (inherited fields first).
    Fields(Vec<Slot>),
    Array(ArrayData),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapObject {
    pub class: ClassId,
    pub body: ObjectBody,
}

impl HeapObject {
    pub fn instance(class: ClassId, fields: Vec<Slot>) -> Self {
        Self {
            class,
            body: ObjectBody::Fields(fields),
        }
    }

    pub fn array(class: ClassId, data: ArrayData) -> Self {
        Self {
            class,
            body: ObjectBody::Array(data),
        }
    }

    pub fn fields(&self) -> Option<&[Slot]> {
        match &self.body {
            ObjectBody::Fields(fields) => Some(fields),
            ObjectBody::Array(_) => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut Vec<Slot>> {
        match &mut self.body {
            ObjectBody::Fields(fields) => Some(fields),
            ObjectBody::Array(_) => None,
        }
    }

    pub fn array_data(&self) -> Option<&ArrayData> {
        match &self.body {
            ObjectBody::Array(data) => Some(data),
            ObjectBody::Fields(_) => None,
        }
    }

    /// Every non-null reference held by this object, in slot order.
    pub fn references(&self) -> Vec<ObjectId> {
        match &self.body {
            ObjectBody::Fields(fields) => fields
                .iter()
                .filter_map(|s| s.as_reference().flatten())
                .collect(),
            ObjectBody::Array(ArrayData::Reference(refs)) => refs.iter().flatten().copied().collect(),
            ObjectBody::Array(ArrayData::Primitive(_)) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_references_skip_nulls_and_primitives() {
        let obj = HeapObject::instance(
            ClassId(0),
            vec![Slot::int(4), Slot::object(ObjectId(7)), Slot::NULL],
        );
        assert_eq!(obj.references(), vec![ObjectId(7)]);

        let arr = HeapObject::array(
            ClassId(1),
            ArrayData::Reference(vec![None, Some(ObjectId(2)), Some(ObjectId(2))]),
        );
        assert_eq!(arr.references(), vec![ObjectId(2), ObjectId(2)]);
        assert_eq!(arr.array_data().map(ArrayData::len), Some(3));
        assert!(arr.fields().is_none());
    }
}
