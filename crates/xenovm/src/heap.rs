//! # Heap
//!
//! Object arena plus the reference table.
//!
//! Tests read [`Heap::live_refs`] to check that a client releases every
//! reference it was handed.
//!
//! [`Heap::collect`] is a mark and sweep over the arena. Live references
//! are always roots; the caller adds the rest (class statics and mirrors).
//! It must not run while a native body is on the stack, since ids held in
//! native locals are not roots. Freed slots are reused by later allocations.

use std::collections::HashMap;

use xenoabi::ForeignError;
use xenoabi::ForeignValue;
use xenoabi::PrimitiveKind;
use xenoabi::RawRef;
use xenoabi::TypeSig;

use crate::class::ClassId;

/// Index of an object in the arena.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ObjId(pub u32);

/// A value stored in a field, an argument slot or a list element.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Slot {
    Void,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Ref(ObjId),
}

impl Slot {
    /// The zero value of a type.
    pub fn default_for(ty: &TypeSig) -> Slot {
        match ty {
            TypeSig::Void => Slot::Void,
            TypeSig::Object(_) => Slot::Null,
            TypeSig::Primitive(kind) => match kind {
                PrimitiveKind::Boolean => Slot::Boolean(false),
                PrimitiveKind::Byte => Slot::Byte(0),
                PrimitiveKind::Char => Slot::Char(0),
                PrimitiveKind::Short => Slot::Short(0),
                PrimitiveKind::Int => Slot::Int(0),
                PrimitiveKind::Long => Slot::Long(0),
                PrimitiveKind::Float => Slot::Float(0.0),
                PrimitiveKind::Double => Slot::Double(0.0),
            },
        }
    }

    pub fn as_ref(&self) -> Option<ObjId> {
        match self {
            Slot::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Slot::Null | Slot::Ref(_))
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Slot::Boolean(_) => PrimitiveKind::Boolean,
            Slot::Byte(_) => PrimitiveKind::Byte,
            Slot::Char(_) => PrimitiveKind::Char,
            Slot::Short(_) => PrimitiveKind::Short,
            Slot::Int(_) => PrimitiveKind::Int,
            Slot::Long(_) => PrimitiveKind::Long,
            Slot::Float(_) => PrimitiveKind::Float,
            Slot::Double(_) => PrimitiveKind::Double,
            Slot::Void | Slot::Null | Slot::Ref(_) => return None,
        })
    }
}

/// Runtime-internal state attached to an object beyond its fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    None,
    Str(Vec<u16>),
    /// The class object of a class.
    Mirror(ClassId),
    Method { class: ClassId, index: usize, ctor: bool },
    Field { class: ClassId, index: usize },
    List(Vec<Slot>),
}

#[derive(Clone, Debug)]
pub struct Object {
    pub class: ClassId,
    pub fields: Vec<Slot>,
    pub payload: Payload,
}

#[derive(Default)]
pub struct Heap {
    objects: Vec<Object>,
    live: Vec<bool>,
    free: Vec<u32>,
    refs: HashMap<u64, ObjId>,
    next_ref: u64,
    allocated_since_collect: usize,
}

impl Heap {
    pub fn alloc(&mut self, object: Object) -> ObjId {
        self.allocated_since_collect += 1;
        if let Some(index) = self.free.pop() {
            self.objects[index as usize] = object;
            self.live[index as usize] = true;
            return ObjId(index);
        }
        let id = ObjId(self.objects.len() as u32);
        self.objects.push(object);
        self.live.push(true);
        id
    }

    pub fn get(&self, id: ObjId) -> &Object {
        &self.objects[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ObjId) -> &mut Object {
        &mut self.objects[id.0 as usize]
    }

    /// Objects currently allocated.
    pub fn len(&self) -> usize {
        self.objects.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates every live object id in slot order.
    pub fn ids(&self) -> impl Iterator<Item = ObjId> + '_ {
        self.live.iter().enumerate().filter(|(_, live)| **live).map(|(i, _)| ObjId(i as u32))
    }

    pub fn allocated_since_collect(&self) -> usize {
        self.allocated_since_collect
    }

    /// Frees every object not reachable from a live reference or from
    /// `roots`. Returns how many were freed.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjId>) -> usize {
        let mut marked = vec![false; self.objects.len()];
        let mut pending: Vec<ObjId> = self.refs.values().copied().chain(roots).collect();

        while let Some(id) = pending.pop() {
            let index = id.0 as usize;
            if marked[index] {
                continue;
            }
            marked[index] = true;
            let object = &self.objects[index];
            let list = match &object.payload {
                Payload::List(items) => items.as_slice(),
                _ => &[],
            };
            pending.extend(object.fields.iter().chain(list).filter_map(Slot::as_ref));
        }

        let mut freed = 0;
        for (index, reachable) in marked.into_iter().enumerate() {
            if reachable || !self.live[index] {
                continue;
            }
            // Drop the contents now; the slot itself waits for reuse.
            self.objects[index] = Object { class: self.objects[index].class, fields: Vec::new(), payload: Payload::None };
            self.live[index] = false;
            self.free.push(index as u32);
            freed += 1;
        }
        self.allocated_since_collect = 0;
        freed
    }

    // --- Reference table ---

    pub fn new_ref(&mut self, id: ObjId) -> RawRef {
        self.next_ref += 1;
        self.refs.insert(self.next_ref, id);
        RawRef(self.next_ref)
    }

    pub fn deref(&self, r: RawRef) -> Result<ObjId, ForeignError> {
        self.refs.get(&r.0).copied().ok_or(ForeignError::InvalidRef(r))
    }

    pub fn delete_ref(&mut self, r: RawRef) -> Result<(), ForeignError> {
        self.refs.remove(&r.0).map(|_| ()).ok_or(ForeignError::InvalidRef(r))
    }

    pub fn live_refs(&self) -> usize {
        self.refs.len()
    }

    // --- Boundary conversion ---

    /// Converts an incoming boundary value, resolving references.
    pub fn slot_from(&self, value: ForeignValue) -> Result<Slot, ForeignError> {
        Ok(match value {
            ForeignValue::Void => Slot::Void,
            ForeignValue::Boolean(v) => Slot::Boolean(v),
            ForeignValue::Byte(v) => Slot::Byte(v),
            ForeignValue::Char(v) => Slot::Char(v),
            ForeignValue::Short(v) => Slot::Short(v),
            ForeignValue::Int(v) => Slot::Int(v),
            ForeignValue::Long(v) => Slot::Long(v),
            ForeignValue::Float(v) => Slot::Float(v),
            ForeignValue::Double(v) => Slot::Double(v),
            ForeignValue::Ref(None) => Slot::Null,
            ForeignValue::Ref(Some(r)) => Slot::Ref(self.deref(r)?),
        })
    }

    /// Converts an outgoing value. Every object reference becomes a fresh
    /// ref owned by the receiver.
    pub fn value_from(&mut self, slot: Slot) -> ForeignValue {
        match slot {
            Slot::Void => ForeignValue::Void,
            Slot::Boolean(v) => ForeignValue::Boolean(v),
            Slot::Byte(v) => ForeignValue::Byte(v),
            Slot::Char(v) => ForeignValue::Char(v),
            Slot::Short(v) => ForeignValue::Short(v),
            Slot::Int(v) => ForeignValue::Int(v),
            Slot::Long(v) => ForeignValue::Long(v),
            Slot::Float(v) => ForeignValue::Float(v),
            Slot::Double(v) => ForeignValue::Double(v),
            Slot::Null => ForeignValue::Ref(None),
            Slot::Ref(id) => ForeignValue::Ref(Some(self.new_ref(id))),
        }
    }
}
