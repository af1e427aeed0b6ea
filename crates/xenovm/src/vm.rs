//! # Vm
//!
//! The runtime proper: class table, heap, thread attachment and the
//! [`ForeignRuntime`] implementation.
//!
//! ## Invariants
//!
//! - All state sits behind one mutex; foreign calls are serialized.
//! - Native bodies only see the state through [`Ctx`] and never re-enter
//!   the lock.
//! - Arguments are checked against the declared parameter types before a
//!   body runs, the way a checked native interface would, so a client that
//!   marshals badly gets `BadArguments` instead of a confused body.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::ThreadId;

use dashmap::DashSet;
use parking_lot::Mutex;
use xenoabi::FieldId;
use xenoabi::FieldInfo;
use xenoabi::FieldTarget;
use xenoabi::ForeignError;
use xenoabi::ForeignRuntime;
use xenoabi::ForeignValue;
use xenoabi::MethodId;
use xenoabi::MethodInfo;
use xenoabi::RawRef;
use xenoabi::RefKind;
use xenoabi::Result;
use xenoabi::TypeSig;
use xenoabi::sig::dotted;

use crate::CLASS;
use crate::OBJECT;
use crate::STRING;
use crate::class::Class;
use crate::class::ClassBuilder;
use crate::class::ClassId;
use crate::class::DefineError;
use crate::heap::Heap;
use crate::heap::ObjId;
use crate::heap::Object;
use crate::heap::Payload;
use crate::heap::Slot;
use crate::rt;

/// Allocations between collections triggered by `delete_ref`.
const COLLECT_EVERY: usize = 4096;

/// A pending throwable, unwinding out of a native body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Throw(pub ObjId);

/// Startup options, in the `-D`/`-verbose` style of a JVM command line.
#[derive(Clone, Debug, Default)]
pub struct VmOptions {
    pub properties: HashMap<String, String>,
    pub verbose_class: bool,
    /// Options that were not understood and were skipped.
    pub ignored: Vec<String>,
}

impl VmOptions {
    pub fn parse(options: &[String]) -> Self {
        let mut parsed = VmOptions::default();
        for option in options {
            if let Some(prop) = option.strip_prefix("-D") {
                let (key, value) = prop.split_once('=').unwrap_or((prop, ""));
                parsed.properties.insert(key.to_string(), value.to_string());
            } else if option == "-verbose:class" {
                parsed.verbose_class = true;
            } else {
                tracing::debug!(option = %option, "ignoring unrecognized runtime option");
                parsed.ignored.push(option.clone());
            }
        }
        parsed
    }
}

pub(crate) struct State {
    pub(crate) heap: Heap,
    pub(crate) classes: Vec<Class>,
    by_name: HashMap<String, ClassId>,
    properties: HashMap<String, String>,
}

impl State {
    fn new(properties: HashMap<String, String>) -> Self {
        Self {
            heap: Heap::default(),
            classes: Vec::new(),
            by_name: HashMap::new(),
            properties,
        }
    }

    pub(crate) fn define(&mut self, builder: ClassBuilder) -> std::result::Result<ClassId, DefineError> {
        if self.by_name.contains_key(&builder.name) {
            return Err(DefineError::Duplicate(builder.name));
        }
        let (methods, ctors, fields) = builder.parse()?;

        let lookup = |name: &String| {
            self.by_name.get(name).copied().ok_or_else(|| DefineError::UnknownClass {
                class: builder.name.clone(),
                missing: name.clone(),
            })
        };
        let superclass = builder.superclass.as_ref().map(lookup).transpose()?;
        let interfaces = builder.interfaces.iter().map(lookup).collect::<std::result::Result<Vec<_>, _>>()?;

        let id = ClassId(self.classes.len() as u32);
        let mut layout = superclass.map(|s| self.class(s).layout.clone()).unwrap_or_default();
        let mut statics = Vec::new();
        let mut field_slots = Vec::with_capacity(fields.len());
        for field in &fields {
            if field.is_static {
                field_slots.push(statics.len());
                statics.push(field.init.unwrap_or_else(|| Slot::default_for(&field.ty)));
            } else {
                field_slots.push(layout.len());
                layout.push(field.ty.clone());
            }
        }

        // Until java.lang.Class exists, mirrors point at their own class and get patched below.
        let mirror_class = self.by_name.get(CLASS).copied().unwrap_or(id);
        let mirror = self.heap.alloc(Object {
            class: mirror_class,
            fields: Vec::new(),
            payload: Payload::Mirror(id),
        });

        let name = builder.name;
        self.classes.push(Class {
            name: name.clone(),
            superclass,
            interfaces,
            is_interface: builder.is_interface,
            is_abstract: builder.is_abstract,
            methods,
            ctors,
            fields,
            field_slots,
            layout,
            statics,
            mirror,
        });

        if name == CLASS {
            let mirrors: Vec<ObjId> =
                self.heap.ids().filter(|obj| matches!(self.heap.get(*obj).payload, Payload::Mirror(_))).collect();
            for obj in mirrors {
                self.heap.get_mut(obj).class = id;
            }
        }
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Collects with every class's statics and mirror as roots.
    fn collect_garbage(&mut self) -> usize {
        let roots: Vec<ObjId> = self
            .classes
            .iter()
            .flat_map(|c| c.statics.iter().filter_map(Slot::as_ref).chain([c.mirror]))
            .collect();
        self.heap.collect(roots)
    }

    pub(crate) fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.0 as usize]
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    fn class_of(&self, obj: ObjId) -> ClassId {
        self.heap.get(obj).class
    }

    fn is_subclass(&self, class: ClassId, target: ClassId) -> bool {
        if class == target {
            return true;
        }
        let c = self.class(class);
        c.superclass.is_some_and(|s| self.is_subclass(s, target))
            || c.interfaces.iter().any(|i| self.is_subclass(*i, target))
    }

    fn is_assignable(&self, class: ClassId, target: &str) -> bool {
        if target == OBJECT {
            return true;
        }
        self.lookup(target).is_some_and(|t| self.is_subclass(class, t))
    }

    fn fits(&self, slot: &Slot, ty: &TypeSig) -> bool {
        match ty {
            TypeSig::Void => false,
            TypeSig::Primitive(kind) => slot.primitive_kind() == Some(*kind),
            TypeSig::Object(name) => match slot {
                Slot::Null => true,
                Slot::Ref(id) => self.is_assignable(self.class_of(*id), name),
                _ => false,
            },
        }
    }

    fn check_args(&self, params: &[TypeSig], args: &[Slot]) -> std::result::Result<(), String> {
        if params.len() != args.len() {
            return Err(format!("expected {} arguments, got {}", params.len(), args.len()));
        }
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            if !self.fits(arg, param) {
                return Err(format!("argument {} ({:?}) does not fit {}", i, arg, param));
            }
        }
        Ok(())
    }

    /// Finds the implementation of an instance method for a receiver of class `class`.
    fn find_virtual(&self, class: ClassId, name: &str, params: &[TypeSig]) -> Option<(ClassId, usize)> {
        let mut current = Some(class);
        while let Some(c) = current {
            let def = self.class(c);
            if let Some(index) = def.find_method(name, params, false) {
                if def.methods[index].body.is_some() {
                    return Some((c, index));
                }
            }
            current = def.superclass;
        }
        None
    }

    /// Finds a field by name on a class, its superclasses or its interfaces.
    fn resolve_field(&self, class: ClassId, name: &str) -> Option<(ClassId, usize)> {
        let def = self.class(class);
        if let Some(index) = def.find_field(name) {
            return Some((class, index));
        }
        def.interfaces
            .iter()
            .find_map(|i| self.resolve_field(*i, name))
            .or_else(|| def.superclass.and_then(|s| self.resolve_field(s, name)))
    }

    pub(crate) fn alloc_instance(&mut self, class: ClassId) -> ObjId {
        let fields = self.class(class).layout.iter().map(Slot::default_for).collect();
        self.heap.alloc(Object { class, fields, payload: Payload::None })
    }

    fn read_field(&self, obj: Option<ObjId>, class: ClassId, index: usize) -> Slot {
        let def = self.class(class);
        let slot = def.field_slots[index];
        match obj {
            Some(obj) if !def.fields[index].is_static => self.heap.get(obj).fields[slot],
            _ => def.statics[slot],
        }
    }

    fn write_field(&mut self, obj: Option<ObjId>, class: ClassId, index: usize, value: Slot) {
        let (slot, is_static) = {
            let def = self.class(class);
            (def.field_slots[index], def.fields[index].is_static)
        };
        match obj {
            Some(obj) if !is_static => self.heap.get_mut(obj).fields[slot] = value,
            _ => self.classes[class.0 as usize].statics[slot] = value,
        }
    }

    fn run(&mut self, class: ClassId, index: usize, ctor: bool, this: Option<ObjId>, args: &[Slot]) -> std::result::Result<Slot, Throw> {
        let def = self.class(class);
        let body = if ctor { def.ctors[index].body.clone() } else { def.methods[index].body.clone() };
        match body {
            Some(body) => body(&mut Ctx { state: self }, this, args),
            None => {
                let name = format!("{}.{}", def.name, def.methods[index].name);
                Err(Ctx { state: self }.throw("java.lang.AbstractMethodError", Some(&name)))
            }
        }
    }
}

/// The native body's view of the runtime.
pub struct Ctx<'a> {
    pub(crate) state: &'a mut State,
}

impl Ctx<'_> {
    // --- Strings ---

    pub fn new_string(&mut self, s: &str) -> ObjId {
        self.new_string_utf16(s.encode_utf16().collect())
    }

    pub fn new_string_utf16(&mut self, units: Vec<u16>) -> ObjId {
        let class = self.state.lookup(STRING).unwrap_or(ClassId(0));
        let obj = self.state.alloc_instance(class);
        self.state.heap.get_mut(obj).payload = Payload::Str(units);
        obj
    }

    /// UTF-16 contents of a string object.
    pub fn utf16(&self, obj: ObjId) -> Option<&[u16]> {
        match &self.state.heap.get(obj).payload {
            Payload::Str(units) => Some(units),
            _ => None,
        }
    }

    /// Reads a string argument; null throws `NullPointerException`.
    pub fn string(&mut self, slot: Slot) -> std::result::Result<String, Throw> {
        match slot {
            Slot::Ref(obj) => match self.utf16(obj) {
                Some(units) => Ok(String::from_utf16_lossy(units)),
                None => Err(self.illegal_argument("not a string")),
            },
            _ => Err(self.null_pointer()),
        }
    }

    /// Like [`Self::string`], keeping the raw code units.
    pub fn string_units(&mut self, slot: Slot) -> std::result::Result<Vec<u16>, Throw> {
        match slot {
            Slot::Ref(obj) => match self.utf16(obj) {
                Some(units) => Ok(units.to_vec()),
                None => Err(self.illegal_argument("not a string")),
            },
            _ => Err(self.null_pointer()),
        }
    }

    // --- Objects ---

    /// Allocates an instance without running a constructor.
    pub fn alloc(&mut self, class: &str) -> std::result::Result<ObjId, Throw> {
        match self.state.lookup(class) {
            Some(id) => Ok(self.state.alloc_instance(id)),
            None => Err(self.throw("java.lang.NoClassDefFoundError", Some(class))),
        }
    }

    /// Allocates an instance and runs the constructor matching `descriptor`.
    pub fn construct(&mut self, class: &str, descriptor: &str, args: &[Slot]) -> std::result::Result<ObjId, Throw> {
        let obj = self.alloc(class)?;
        let id = self.state.class_of(obj);
        let params = self.params(descriptor)?;
        let Some(index) = self.state.class(id).ctors.iter().position(|c| c.params == params) else {
            return Err(self.throw("java.lang.NoSuchMethodError", Some(&format!("{}.<init>{}", class, descriptor))));
        };
        self.state.run(id, index, true, Some(obj), args)?;
        Ok(obj)
    }

    pub fn class_of(&self, obj: ObjId) -> ClassId {
        self.state.class_of(obj)
    }

    pub fn class_name(&self, class: ClassId) -> &str {
        &self.state.class(class).name
    }

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.state.lookup(&dotted(name))
    }

    pub fn superclass(&self, class: ClassId) -> Option<ClassId> {
        self.state.class(class).superclass
    }

    pub fn is_interface(&self, class: ClassId) -> bool {
        self.state.class(class).is_interface
    }

    pub fn mirror(&self, class: ClassId) -> ObjId {
        self.state.class(class).mirror
    }

    /// The class a class object stands for.
    pub fn mirrored_class(&self, obj: ObjId) -> Option<ClassId> {
        match self.state.heap.get(obj).payload {
            Payload::Mirror(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_instance(&self, obj: ObjId, class: &str) -> bool {
        self.state.is_assignable(self.state.class_of(obj), class)
    }

    pub fn is_subclass(&self, class: ClassId, target: ClassId) -> bool {
        self.state.is_subclass(class, target)
    }

    pub fn list(&mut self, obj: ObjId) -> Option<&mut Vec<Slot>> {
        match &mut self.state.heap.get_mut(obj).payload {
            Payload::List(items) => Some(items),
            _ => None,
        }
    }

    /// Name of the member a reflected method, constructor or field stands for.
    pub fn member_name(&self, obj: ObjId) -> Option<&str> {
        match self.state.heap.get(obj).payload {
            Payload::Method { class, index, ctor } => {
                let c = self.state.class(class);
                Some(if ctor { &c.name } else { &c.methods[index].name })
            }
            Payload::Field { class, index } => Some(&self.state.class(class).fields[index].name),
            _ => None,
        }
    }

    pub fn set_payload(&mut self, obj: ObjId, payload: Payload) {
        self.state.heap.get_mut(obj).payload = payload;
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.state.properties.get(key).map(String::as_str)
    }

    // --- Fields ---

    pub fn field(&mut self, obj: ObjId, name: &str) -> std::result::Result<Slot, Throw> {
        let (class, index) = self.field_location(self.state.class_of(obj), name)?;
        Ok(self.state.read_field(Some(obj), class, index))
    }

    pub fn set_field(&mut self, obj: ObjId, name: &str, value: Slot) -> std::result::Result<(), Throw> {
        let (class, index) = self.field_location(self.state.class_of(obj), name)?;
        self.state.write_field(Some(obj), class, index, value);
        Ok(())
    }

    pub fn static_field(&mut self, class: &str, name: &str) -> std::result::Result<Slot, Throw> {
        let id = self.class_id(class)?;
        let (owner, index) = self.field_location(id, name)?;
        Ok(self.state.read_field(None, owner, index))
    }

    pub fn set_static_field(&mut self, class: &str, name: &str, value: Slot) -> std::result::Result<(), Throw> {
        let id = self.class_id(class)?;
        let (owner, index) = self.field_location(id, name)?;
        self.state.write_field(None, owner, index, value);
        Ok(())
    }

    // --- Calls ---

    /// Virtual call by name and descriptor.
    pub fn call_virtual(&mut self, obj: ObjId, name: &str, descriptor: &str, args: &[Slot]) -> std::result::Result<Slot, Throw> {
        let params = self.params(descriptor)?;
        match self.state.find_virtual(self.state.class_of(obj), name, &params) {
            Some((class, index)) => self.state.run(class, index, false, Some(obj), args),
            None => Err(self.throw("java.lang.NoSuchMethodError", Some(name))),
        }
    }

    pub fn call_static(&mut self, class: &str, name: &str, descriptor: &str, args: &[Slot]) -> std::result::Result<Slot, Throw> {
        let id = self.class_id(class)?;
        let params = self.params(descriptor)?;
        match self.state.class(id).find_method(name, &params, true) {
            Some(index) => self.state.run(id, index, false, None, args),
            None => Err(self.throw("java.lang.NoSuchMethodError", Some(name))),
        }
    }

    /// `toString()` of any slot, `"null"` for null.
    pub fn display(&mut self, slot: Slot) -> std::result::Result<String, Throw> {
        Ok(match slot {
            Slot::Void => String::new(),
            Slot::Null => "null".to_string(),
            Slot::Boolean(v) => v.to_string(),
            Slot::Byte(v) => v.to_string(),
            Slot::Char(v) => String::from_utf16_lossy(&[v]),
            Slot::Short(v) => v.to_string(),
            Slot::Int(v) => v.to_string(),
            Slot::Long(v) => v.to_string(),
            Slot::Float(v) => format!("{:?}", v),
            Slot::Double(v) => format!("{:?}", v),
            Slot::Ref(obj) => {
                if let Some(units) = self.utf16(obj) {
                    return Ok(String::from_utf16_lossy(units));
                }
                let s = self.call_virtual(obj, "toString", "()Ljava/lang/String;", &[])?;
                return self.string(s);
            }
        })
    }

    /// `equals(Object)` of two slots; null equals only null.
    pub fn equals(&mut self, a: Slot, b: Slot) -> std::result::Result<bool, Throw> {
        match a {
            Slot::Ref(obj) => {
                let result = self.call_virtual(obj, "equals", "(Ljava/lang/Object;)Z", &[b])?;
                Ok(result == Slot::Boolean(true))
            }
            other => Ok(other == b),
        }
    }

    // --- Throwing ---

    /// Allocates a throwable of `class` with `message`.
    pub fn throw(&mut self, class: &str, message: Option<&str>) -> Throw {
        let id = self
            .state
            .lookup(class)
            .or_else(|| self.state.lookup("java.lang.Throwable"))
            .unwrap_or(ClassId(0));
        let exc = self.state.alloc_instance(id);
        if let Some(message) = message {
            let text = self.new_string(message);
            if let Some((owner, index)) = self.state.resolve_field(id, "message") {
                self.state.write_field(Some(exc), owner, index, Slot::Ref(text));
            }
        }
        Throw(exc)
    }

    pub fn null_pointer(&mut self) -> Throw {
        self.throw("java.lang.NullPointerException", None)
    }

    pub fn illegal_argument(&mut self, message: &str) -> Throw {
        self.throw("java.lang.IllegalArgumentException", Some(message))
    }

    fn class_id(&mut self, class: &str) -> std::result::Result<ClassId, Throw> {
        match self.state.lookup(class) {
            Some(id) => Ok(id),
            None => Err(self.throw("java.lang.NoClassDefFoundError", Some(class))),
        }
    }

    fn field_location(&mut self, class: ClassId, name: &str) -> std::result::Result<(ClassId, usize), Throw> {
        match self.state.resolve_field(class, name) {
            Some(location) => Ok(location),
            None => Err(self.throw("java.lang.NoSuchFieldError", Some(name))),
        }
    }

    fn params(&mut self, descriptor: &str) -> std::result::Result<Vec<TypeSig>, Throw> {
        match xenoabi::sig::parse_method_descriptor(descriptor) {
            Ok((params, _)) => Ok(params),
            Err(e) => Err(self.illegal_argument(&e.to_string())),
        }
    }
}

/// An in-process foreign runtime.
pub struct Vm {
    state: Mutex<State>,
    attached: DashSet<ThreadId>,
    verbose_class: bool,
    invocations: AtomicU64,
}

impl Vm {
    /// Creates a runtime with the standard class library, attaching the calling thread.
    pub fn new() -> std::result::Result<Self, DefineError> {
        Self::with_options(&VmOptions::default())
    }

    pub fn with_options(options: &VmOptions) -> std::result::Result<Self, DefineError> {
        let mut state = State::new(options.properties.clone());
        rt::install(&mut state)?;

        let vm = Self {
            state: Mutex::new(state),
            attached: DashSet::new(),
            verbose_class: options.verbose_class,
            invocations: AtomicU64::new(0),
        };
        vm.attached.insert(thread::current().id());
        Ok(vm)
    }

    pub fn define(&self, builder: ClassBuilder) -> std::result::Result<ClassId, DefineError> {
        self.state.lock().define(builder)
    }

    /// Runs `f` with direct access to the runtime state, e.g. to allocate
    /// objects that a class definition refers to. Ids kept past `f` must be
    /// stored in a static or held by a reference, or they may be collected.
    pub fn with_ctx<R>(&self, f: impl FnOnce(&mut Ctx<'_>) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut Ctx { state: &mut *state })
    }

    /// Live entries in the reference table.
    pub fn live_refs(&self) -> usize {
        self.state.lock().heap.live_refs()
    }

    pub fn live_objects(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Frees every object that no reference, static field or class mirror
    /// reaches. Returns how many were freed.
    pub fn collect_garbage(&self) -> usize {
        let freed = self.state.lock().collect_garbage();
        tracing::debug!(freed, "collected garbage");
        freed
    }

    /// Number of calls that ran foreign code or touched a field.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub fn is_attached(&self) -> bool {
        self.attached.contains(&thread::current().id())
    }

    fn require_attached(&self) -> Result<()> {
        if self.is_attached() { Ok(()) } else { Err(ForeignError::NotAttached) }
    }

    fn class_ref(state: &State, r: RawRef) -> Result<ClassId> {
        let obj = state.heap.deref(r)?;
        match state.heap.get(obj).payload {
            Payload::Mirror(id) => Ok(id),
            _ => Err(ForeignError::BadArguments(format!("{} is not a class", r))),
        }
    }

    fn method_id(class: ClassId, index: usize, ctor: bool) -> MethodId {
        MethodId(((class.0 as u64) << 32) | ((ctor as u64) << 31) | index as u64)
    }

    fn decode_method(state: &State, id: MethodId) -> Result<(ClassId, usize, bool)> {
        let class = (id.0 >> 32) as usize;
        let ctor = (id.0 >> 31) & 1 == 1;
        let index = (id.0 & 0x7fff_ffff) as usize;
        let exists = state
            .classes
            .get(class)
            .is_some_and(|c| index < if ctor { c.ctors.len() } else { c.methods.len() });
        if exists { Ok((ClassId(class as u32), index, ctor)) } else { Err(ForeignError::InvalidMethod(id)) }
    }

    fn field_id(class: ClassId, index: usize) -> FieldId {
        FieldId(((class.0 as u64) << 32) | index as u64)
    }

    fn decode_field(state: &State, id: FieldId) -> Result<(ClassId, usize)> {
        let class = (id.0 >> 32) as usize;
        let index = (id.0 & 0xffff_ffff) as usize;
        match state.classes.get(class) {
            Some(c) if index < c.fields.len() => Ok((ClassId(class as u32), index)),
            _ => Err(ForeignError::InvalidField(id)),
        }
    }

    fn reflect(state: &mut State, class: ClassId, reflected: &str, count: usize, payload: impl Fn(usize) -> Payload) -> Vec<RawRef> {
        tracing::trace!(class = %state.class(class).name, reflected, count, "reflecting members");
        let reflect_class = state.lookup(reflected).or_else(|| state.lookup(OBJECT)).unwrap_or(ClassId(0));
        (0..count)
            .map(|index| {
                let obj = state.heap.alloc(Object { class: reflect_class, fields: Vec::new(), payload: payload(index) });
                state.heap.new_ref(obj)
            })
            .collect()
    }

    fn args(state: &State, args: &[ForeignValue]) -> Result<Vec<Slot>> {
        args.iter().map(|a| state.heap.slot_from(*a)).collect()
    }

    fn finish(state: &mut State, outcome: std::result::Result<Slot, Throw>) -> Result<ForeignValue> {
        match outcome {
            Ok(slot) => Ok(state.heap.value_from(slot)),
            Err(Throw(exc)) => Err(ForeignError::Thrown(state.heap.new_ref(exc))),
        }
    }
}

impl ForeignRuntime for Vm {
    fn find_class(&self, name: &str) -> Result<Option<RawRef>> {
        self.require_attached()?;
        let name = dotted(name);
        let mut state = self.state.lock();
        let Some(id) = state.lookup(&name) else {
            return Ok(None);
        };
        if self.verbose_class {
            tracing::info!("[Loaded {}]", name);
        }
        let mirror = state.class(id).mirror;
        Ok(Some(state.heap.new_ref(mirror)))
    }

    fn class_name(&self, class: RawRef) -> Result<String> {
        self.require_attached()?;
        let state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        Ok(state.class(id).name.clone())
    }

    fn superclass(&self, class: RawRef) -> Result<Option<RawRef>> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        let superclass = state.class(id).superclass;
        Ok(superclass.map(|s| {
            let mirror = state.class(s).mirror;
            state.heap.new_ref(mirror)
        }))
    }

    fn interfaces(&self, class: RawRef) -> Result<Vec<RawRef>> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        let mirrors: Vec<ObjId> = state.class(id).interfaces.iter().map(|i| state.class(*i).mirror).collect();
        Ok(mirrors.into_iter().map(|m| state.heap.new_ref(m)).collect())
    }

    fn is_interface(&self, class: RawRef) -> Result<bool> {
        self.require_attached()?;
        let state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        Ok(state.class(id).is_interface)
    }

    fn declared_methods(&self, class: RawRef) -> Result<Vec<RawRef>> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        let count = state.class(id).methods.len();
        Ok(Self::reflect(&mut state, id, "java.lang.reflect.Method", count, |index| Payload::Method {
            class: id,
            index,
            ctor: false,
        }))
    }

    fn declared_constructors(&self, class: RawRef) -> Result<Vec<RawRef>> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        let count = state.class(id).ctors.len();
        Ok(Self::reflect(&mut state, id, "java.lang.reflect.Constructor", count, |index| Payload::Method {
            class: id,
            index,
            ctor: true,
        }))
    }

    fn declared_fields(&self, class: RawRef) -> Result<Vec<RawRef>> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        let count = state.class(id).fields.len();
        Ok(Self::reflect(&mut state, id, "java.lang.reflect.Field", count, |index| Payload::Field { class: id, index }))
    }

    fn method_info(&self, method: RawRef) -> Result<MethodInfo> {
        self.require_attached()?;
        let state = self.state.lock();
        let obj = state.heap.deref(method)?;
        let Payload::Method { class, index, ctor } = state.heap.get(obj).payload else {
            return Err(ForeignError::BadArguments(format!("{} is not a reflected method", method)));
        };
        let c = state.class(class);
        let def = if ctor { &c.ctors[index] } else { &c.methods[index] };
        Ok(MethodInfo {
            id: Self::method_id(class, index, ctor),
            name: def.name.clone(),
            is_static: def.is_static,
            params: def.params.clone(),
            ret: def.ret.clone(),
        })
    }

    fn field_info(&self, field: RawRef) -> Result<FieldInfo> {
        self.require_attached()?;
        let state = self.state.lock();
        let obj = state.heap.deref(field)?;
        let Payload::Field { class, index } = state.heap.get(obj).payload else {
            return Err(ForeignError::BadArguments(format!("{} is not a reflected field", field)));
        };
        let def = &state.class(class).fields[index];
        Ok(FieldInfo {
            id: Self::field_id(class, index),
            name: def.name.clone(),
            is_static: def.is_static,
            ty: def.ty.clone(),
        })
    }

    fn ref_kind(&self, obj: RawRef) -> Result<RefKind> {
        self.require_attached()?;
        let state = self.state.lock();
        let id = state.heap.deref(obj)?;
        Ok(match state.heap.get(id).payload {
            Payload::Mirror(_) => RefKind::Class,
            Payload::Method { .. } => RefKind::Method,
            Payload::Field { .. } => RefKind::Field,
            _ => RefKind::Instance,
        })
    }

    fn object_class(&self, obj: RawRef) -> Result<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let id = state.heap.deref(obj)?;
        let mirror = state.class(state.class_of(id)).mirror;
        Ok(state.heap.new_ref(mirror))
    }

    fn is_same_object(&self, a: RawRef, b: RawRef) -> Result<bool> {
        let state = self.state.lock();
        Ok(state.heap.deref(a)? == state.heap.deref(b)?)
    }

    fn new_ref(&self, obj: RawRef) -> Result<RawRef> {
        let mut state = self.state.lock();
        let id = state.heap.deref(obj)?;
        Ok(state.heap.new_ref(id))
    }

    fn delete_ref(&self, obj: RawRef) -> Result<()> {
        let mut state = self.state.lock();
        state.heap.delete_ref(obj)?;
        // Native bodies only run under the lock, so none is on the stack here.
        if state.heap.allocated_since_collect() >= COLLECT_EVERY {
            let freed = state.collect_garbage();
            tracing::trace!(freed, "collected garbage");
        }
        Ok(())
    }

    fn new_object(&self, class: RawRef, ctor: MethodId, args: &[ForeignValue]) -> Result<RawRef> {
        self.require_attached()?;
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        let id = Self::class_ref(&state, class)?;
        let (owner, index, is_ctor) = Self::decode_method(&state, ctor)?;
        if !is_ctor || owner != id {
            return Err(ForeignError::InvalidMethod(ctor));
        }
        let args = Self::args(&state, args)?;
        state
            .check_args(&state.class(id).ctors[index].params, &args)
            .map_err(ForeignError::BadArguments)?;

        if state.class(id).is_abstract {
            let name = state.class(id).name.clone();
            let exc = Ctx { state: &mut *state }.throw("java.lang.InstantiationException", Some(&name));
            return Err(ForeignError::Thrown(state.heap.new_ref(exc.0)));
        }

        let obj = state.alloc_instance(id);
        match state.run(id, index, true, Some(obj), &args) {
            Ok(_) => Ok(state.heap.new_ref(obj)),
            Err(Throw(exc)) => Err(ForeignError::Thrown(state.heap.new_ref(exc))),
        }
    }

    fn call_static(&self, class: RawRef, method: MethodId, args: &[ForeignValue]) -> Result<ForeignValue> {
        self.require_attached()?;
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        Self::class_ref(&state, class)?;
        let (owner, index, ctor) = Self::decode_method(&state, method)?;
        if ctor || !state.class(owner).methods[index].is_static {
            return Err(ForeignError::InvalidMethod(method));
        }
        let args = Self::args(&state, args)?;
        state
            .check_args(&state.class(owner).methods[index].params, &args)
            .map_err(ForeignError::BadArguments)?;

        let outcome = state.run(owner, index, false, None, &args);
        Self::finish(&mut state, outcome)
    }

    fn call_method(&self, obj: RawRef, method: MethodId, args: &[ForeignValue]) -> Result<ForeignValue> {
        self.require_attached()?;
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        let receiver = state.heap.deref(obj)?;
        let (owner, index, ctor) = Self::decode_method(&state, method)?;
        let def = &state.class(owner).methods[index];
        if ctor || def.is_static {
            return Err(ForeignError::InvalidMethod(method));
        }
        let receiver_class = state.class_of(receiver);
        if !state.is_subclass(receiver_class, owner) {
            return Err(ForeignError::BadArguments(format!(
                "receiver of class {} is not a {}",
                state.class(receiver_class).name,
                state.class(owner).name
            )));
        }
        let args = Self::args(&state, args)?;
        state.check_args(&def.params, &args).map_err(ForeignError::BadArguments)?;

        let (name, params) = (def.name.clone(), def.params.clone());
        let outcome = match state.find_virtual(receiver_class, &name, &params) {
            Some((class, index)) => state.run(class, index, false, Some(receiver), &args),
            None => {
                let name = format!("{}.{}", state.class(owner).name, name);
                Err(Ctx { state: &mut *state }.throw("java.lang.AbstractMethodError", Some(&name)))
            }
        };
        Self::finish(&mut state, outcome)
    }

    fn get_field(&self, target: FieldTarget, field: FieldId) -> Result<ForeignValue> {
        self.require_attached()?;
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        let (class, index) = Self::decode_field(&state, field)?;
        let obj = Self::field_receiver(&state, target, class, index)?;
        let slot = state.read_field(obj, class, index);
        Ok(state.heap.value_from(slot))
    }

    fn set_field(&self, target: FieldTarget, field: FieldId, value: ForeignValue) -> Result<()> {
        self.require_attached()?;
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        let (class, index) = Self::decode_field(&state, field)?;
        let obj = Self::field_receiver(&state, target, class, index)?;
        let slot = state.heap.slot_from(value)?;
        let ty = &state.class(class).fields[index].ty;
        if !state.fits(&slot, ty) {
            return Err(ForeignError::BadArguments(format!("{:?} does not fit field of type {}", slot, ty)));
        }
        state.write_field(obj, class, index, slot);
        Ok(())
    }

    fn new_string(&self, utf16: &[u16]) -> Result<RawRef> {
        self.require_attached()?;
        let mut state = self.state.lock();
        let obj = Ctx { state: &mut *state }.new_string_utf16(utf16.to_vec());
        Ok(state.heap.new_ref(obj))
    }

    fn string_utf16(&self, s: RawRef) -> Result<Vec<u16>> {
        self.require_attached()?;
        let state = self.state.lock();
        let obj = state.heap.deref(s)?;
        match &state.heap.get(obj).payload {
            Payload::Str(units) => Ok(units.clone()),
            _ => Err(ForeignError::BadArguments(format!("{} is not a string", s))),
        }
    }

    fn attach_current_thread(&self) -> Result<bool> {
        Ok(self.attached.insert(thread::current().id()))
    }

    fn detach_current_thread(&self) -> Result<()> {
        self.attached.remove(&thread::current().id());
        Ok(())
    }
}

impl Vm {
    /// Validates the object side of a field access; `None` for static fields.
    fn field_receiver(state: &State, target: FieldTarget, class: ClassId, index: usize) -> Result<Option<ObjId>> {
        let is_static = state.class(class).fields[index].is_static;
        match target {
            FieldTarget::Static(r) => {
                Self::class_ref(state, r)?;
                if is_static {
                    Ok(None)
                } else {
                    Err(ForeignError::BadArguments("instance field accessed statically".to_string()))
                }
            }
            FieldTarget::Instance(r) => {
                let obj = state.heap.deref(r)?;
                if is_static {
                    return Ok(None);
                }
                if state.is_subclass(state.class_of(obj), class) {
                    Ok(Some(obj))
                } else {
                    Err(ForeignError::BadArguments(format!("{} has no field {}", r, state.class(class).fields[index].name)))
                }
            }
        }
    }
}
