//! # Classes
//!
//! Class definitions and the builder used to declare them.
//!
//! Method bodies are native closures. A body receives a [`Ctx`] onto the
//! runtime state, the receiver (`None` for static methods) and arguments that
//! the runtime has already checked against the declared parameter types.

use std::sync::Arc;

use xenoabi::ForeignError;
use xenoabi::TypeSig;
use xenoabi::sig::dotted;
use xenoabi::sig::parse_method_descriptor;

use crate::heap::ObjId;
use crate::heap::Slot;
use crate::vm::Ctx;
use crate::vm::Throw;

/// Index of a class in the runtime's class table.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClassId(pub u32);

pub type NativeFn = dyn Fn(&mut Ctx<'_>, Option<ObjId>, &[Slot]) -> Result<Slot, Throw> + Send + Sync;

#[derive(Clone)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
    pub is_static: bool,
    /// `None` for abstract and interface methods.
    pub body: Option<Arc<NativeFn>>,
}

#[derive(Clone, Debug)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeSig,
    pub is_static: bool,
    /// Static initial value; instance fields start at the type's zero value.
    pub init: Option<Slot>,
}

pub struct Class {
    pub name: String,
    pub superclass: Option<ClassId>,
    pub interfaces: Vec<ClassId>,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub methods: Vec<MethodDef>,
    pub ctors: Vec<MethodDef>,
    pub fields: Vec<FieldDef>,
    /// Per declared field: offset into the instance layout, or index into `statics`.
    pub field_slots: Vec<usize>,
    /// Instance fields including inherited ones.
    pub layout: Vec<TypeSig>,
    pub statics: Vec<Slot>,
    pub mirror: ObjId,
}

#[derive(Debug, thiserror::Error)]
pub enum DefineError {
    #[error("class {0} is already defined")]
    Duplicate(String),
    #[error("class {class} refers to undefined class {missing}")]
    UnknownClass { class: String, missing: String },
    #[error("class {class}: {source}")]
    Descriptor { class: String, source: ForeignError },
    #[error("class {class}: static field {field} initial value does not match its type")]
    BadInitializer { class: String, field: String },
}

#[derive(Clone)]
struct PendingMethod {
    name: String,
    descriptor: String,
    is_static: bool,
    body: Option<Arc<NativeFn>>,
}

#[derive(Clone)]
struct PendingField {
    name: String,
    descriptor: String,
    is_static: bool,
    init: Option<Slot>,
}

/// Declares a class for [`crate::Vm::define`].
///
/// ```ignore
/// ClassBuilder::new("demo.Counter")
///     .field("count", "I")
///     .constructor("()V", |_, _, _| Ok(Slot::Void))
///     .method("bump", "()I", |ctx, this, _| { ... })
/// ```
#[derive(Clone)]
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) superclass: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) is_interface: bool,
    pub(crate) is_abstract: bool,
    methods: Vec<PendingMethod>,
    ctors: Vec<PendingMethod>,
    fields: Vec<PendingField>,
}

impl ClassBuilder {
    /// A concrete class extending `java.lang.Object`.
    pub fn new(name: &str) -> Self {
        let name = dotted(name);
        let superclass = (name != crate::OBJECT).then(|| crate::OBJECT.to_string());
        Self {
            name,
            superclass,
            interfaces: Vec::new(),
            is_interface: false,
            is_abstract: false,
            methods: Vec::new(),
            ctors: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// An interface. Interfaces have no superclass; use [`Self::implements`]
    /// for superinterfaces.
    pub fn interface(name: &str) -> Self {
        Self { superclass: None, is_interface: true, is_abstract: true, ..Self::new(name) }
    }

    pub fn extends(mut self, name: &str) -> Self {
        self.superclass = Some(dotted(name));
        self
    }

    pub fn implements(mut self, name: &str) -> Self {
        self.interfaces.push(dotted(name));
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn method<F>(self, name: &str, descriptor: &str, body: F) -> Self
    where
        F: Fn(&mut Ctx<'_>, Option<ObjId>, &[Slot]) -> Result<Slot, Throw> + Send + Sync + 'static,
    {
        self.push_method(name, descriptor, false, Some(Arc::new(body)))
    }

    pub fn static_method<F>(self, name: &str, descriptor: &str, body: F) -> Self
    where
        F: Fn(&mut Ctx<'_>, Option<ObjId>, &[Slot]) -> Result<Slot, Throw> + Send + Sync + 'static,
    {
        self.push_method(name, descriptor, true, Some(Arc::new(body)))
    }

    pub fn abstract_method(self, name: &str, descriptor: &str) -> Self {
        self.push_method(name, descriptor, false, None)
    }

    /// Constructors receive the freshly allocated object as `this`.
    pub fn constructor<F>(mut self, descriptor: &str, body: F) -> Self
    where
        F: Fn(&mut Ctx<'_>, Option<ObjId>, &[Slot]) -> Result<Slot, Throw> + Send + Sync + 'static,
    {
        self.ctors.push(PendingMethod {
            name: "<init>".to_string(),
            descriptor: descriptor.to_string(),
            is_static: false,
            body: Some(Arc::new(body)),
        });
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(PendingField {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: false,
            init: None,
        });
        self
    }

    pub fn static_field(mut self, name: &str, descriptor: &str, init: Slot) -> Self {
        self.fields.push(PendingField {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static: true,
            init: Some(init),
        });
        self
    }

    fn push_method(mut self, name: &str, descriptor: &str, is_static: bool, body: Option<Arc<NativeFn>>) -> Self {
        self.methods.push(PendingMethod {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_static,
            body,
        });
        self
    }

    /// Parses every descriptor. Resolution of class references happens in the runtime.
    pub(crate) fn parse(&self) -> Result<(Vec<MethodDef>, Vec<MethodDef>, Vec<FieldDef>), DefineError> {
        let wrap = |source| DefineError::Descriptor { class: self.name.clone(), source };

        let parse_methods = |pending: &[PendingMethod]| -> Result<Vec<MethodDef>, DefineError> {
            pending
                .iter()
                .map(|m| {
                    let (params, ret) = parse_method_descriptor(&m.descriptor).map_err(wrap)?;
                    Ok(MethodDef {
                        name: m.name.clone(),
                        params,
                        ret,
                        is_static: m.is_static,
                        body: m.body.clone(),
                    })
                })
                .collect()
        };

        let methods = parse_methods(&self.methods)?;
        let ctors = parse_methods(&self.ctors)?;

        let mut fields = Vec::with_capacity(self.fields.len());
        for f in &self.fields {
            let ty = TypeSig::parse(&f.descriptor).map_err(wrap)?;
            if let Some(init) = &f.init {
                let fits = match &ty {
                    TypeSig::Primitive(kind) => init.primitive_kind() == Some(*kind),
                    TypeSig::Object(_) => init.is_reference(),
                    TypeSig::Void => false,
                };
                if !fits {
                    return Err(DefineError::BadInitializer { class: self.name.clone(), field: f.name.clone() });
                }
            }
            fields.push(FieldDef { name: f.name.clone(), ty, is_static: f.is_static, init: f.init });
        }

        Ok((methods, ctors, fields))
    }
}

impl Class {
    pub fn find_method(&self, name: &str, params: &[TypeSig], is_static: bool) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.is_static == is_static && m.params == params)
    }

    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
