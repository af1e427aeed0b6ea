//! # Object and Class Proxies
//!
//! The local face of foreign objects and classes.
//!
//! Attribute access is an explicit [`lookup`](ProxyObject::lookup) that
//! returns a tagged [`Attribute`]: a callable over a method group, the
//! current value of a field, or nothing. Callables are built per access and
//! re-resolve their overload on every invocation.
//!
//! ## Lookup order
//!
//! On an object: method group, then field (instance or static).
//!
//! On a class: a group with static overloads, a static field, a group of
//! instance methods (invoked with the receiver as first argument), and
//! finally instance methods of `java.lang.Class` bound to the class object
//! itself. That last step is how `String.getName()` works while the static
//! `Class.forName` stays unreachable from `String`.
//!
//! ## Invariants
//!
//! - Equality between proxies is foreign identity.
//! - Resolution and marshaling failures happen before anything is invoked.
//! - A field write that fails its type check leaves the field untouched.

use std::fmt;
use std::sync::Arc;

use xenoabi::FieldTarget;
use xenoabi::ForeignError;
use xenoabi::ForeignValue;
use xenoabi::RawRef;
use xenoabi::TypeSig;

use crate::CLASS;
use crate::STRING;
use crate::THROWABLE;
use crate::error::Error;
use crate::error::Result;
use crate::handles::Handle;
use crate::handles::HandleKind;
use crate::handles::Scope;
use crate::marshal;
use crate::reflect::ClassDescriptor;
use crate::reflect::FieldDescriptor;
use crate::reflect::MethodGroup;
use crate::reflect::Overload;
use crate::reflect::TypeOracle;
use crate::resolve::MatchFailure;
use crate::resolve::resolve;
use crate::session::Session;
use crate::value::Value;

/// Result of an attribute lookup.
#[derive(Debug)]
pub enum Attribute {
    Callable(BoundCallable),
    Field(Value),
    NotFound,
}

fn not_found(class: &ClassDescriptor, name: &str) -> Error {
    Error::AttributeNotFound {
        class: class.name().to_string(),
        name: name.to_string(),
    }
}

fn into_callable(attribute: Attribute, class: &ClassDescriptor, name: &str) -> Result<BoundCallable> {
    match attribute {
        Attribute::Callable(callable) => Ok(callable),
        Attribute::Field(value) => Err(Error::type_error(format!("method {}.{}", class.name(), name), value.type_name())),
        Attribute::NotFound => Err(not_found(class, name)),
    }
}

/// A foreign object.
#[derive(Clone)]
pub struct ProxyObject {
    session: Session,
    handle: Arc<Handle>,
    class: Arc<ClassDescriptor>,
}

impl ProxyObject {
    pub(crate) fn new(session: Session, handle: Arc<Handle>, class: Arc<ClassDescriptor>) -> Self {
        Self { session, handle, class }
    }

    /// Descriptor of the object's dynamic class.
    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn lookup(&self, name: &str) -> Result<Attribute> {
        if let Some(group) = self.class.method(name) {
            let receiver = Value::Object(self.clone());
            return Ok(Attribute::Callable(BoundCallable::new(
                &self.session,
                &self.class,
                group,
                Dispatch::Bound(receiver),
            )));
        }
        if let Some(field) = self.class.field(name) {
            return Ok(Attribute::Field(self.read(field)?));
        }
        Ok(Attribute::NotFound)
    }

    /// Like [`Self::lookup`], failing with `AttributeNotFound` instead of
    /// returning [`Attribute::NotFound`].
    pub fn getattr(&self, name: &str) -> Result<Attribute> {
        match self.lookup(name)? {
            Attribute::NotFound => Err(not_found(&self.class, name)),
            found => Ok(found),
        }
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        into_callable(self.getattr(name)?, &self.class, name)?.invoke(args)
    }

    pub fn get_field(&self, name: &str) -> Result<Value> {
        let field = self.class.field(name).ok_or_else(|| not_found(&self.class, name))?;
        self.read(field)
    }

    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let field = self.class.field(name).ok_or_else(|| not_found(&self.class, name))?;
        let target = self.target(field)?;
        write_field(&self.session, field, target, &value.into())
    }

    /// Whether both proxies wrap the same foreign object.
    pub fn is_same(&self, other: &ProxyObject) -> Result<bool> {
        self.session.registry().identity_equal(&self.handle, &other.handle)
    }

    /// The object's `toString()`.
    pub fn display(&self) -> Result<String> {
        match self.call("toString", &[])? {
            Value::Str(s) => Ok(s),
            Value::Null => Ok("null".to_string()),
            other => Err(Error::type_error(STRING, other.type_name())),
        }
    }

    fn target(&self, field: &FieldDescriptor) -> Result<FieldTarget> {
        Ok(if field.is_static {
            FieldTarget::Static(self.class.handle().raw()?)
        } else {
            FieldTarget::Instance(self.handle.raw()?)
        })
    }

    fn read(&self, field: &FieldDescriptor) -> Result<Value> {
        let target = self.target(field)?;
        read_field(&self.session, field, target)
    }
}

impl PartialEq for ProxyObject {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other).unwrap_or(false)
    }
}

impl fmt::Debug for ProxyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyObject({} {})", self.class.name(), self.handle.key())
    }
}

/// A foreign class.
#[derive(Clone)]
pub struct ProxyClass {
    session: Session,
    handle: Arc<Handle>,
    class: Arc<ClassDescriptor>,
}

impl ProxyClass {
    pub(crate) fn new(session: Session, handle: Arc<Handle>, class: Arc<ClassDescriptor>) -> Self {
        Self { session, handle, class }
    }

    pub fn name(&self) -> &str {
        self.class.name()
    }

    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    pub fn lookup(&self, name: &str) -> Result<Attribute> {
        let group = self.class.method(name);
        if let Some(group) = group.filter(|g| g.has_static()) {
            return Ok(Attribute::Callable(self.unbound(group)?));
        }
        if let Some(field) = self.class.field(name).filter(|f| f.is_static) {
            let target = FieldTarget::Static(self.handle.raw()?);
            return Ok(Attribute::Field(read_field(&self.session, field, target)?));
        }
        if let Some(group) = group {
            return Ok(Attribute::Callable(self.unbound(group)?));
        }

        let meta = self.session.describe(CLASS)?;
        if let Some(group) = meta.method(name).filter(|g| g.has_instance()) {
            let receiver = Value::Class(self.clone());
            return Ok(Attribute::Callable(BoundCallable::new(
                &self.session,
                &meta,
                &Arc::new(group.instance_only()),
                Dispatch::Bound(receiver),
            )));
        }
        Ok(Attribute::NotFound)
    }

    pub fn getattr(&self, name: &str) -> Result<Attribute> {
        match self.lookup(name)? {
            Attribute::NotFound => Err(not_found(&self.class, name)),
            found => Ok(found),
        }
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        into_callable(self.getattr(name)?, &self.class, name)?.invoke(args)
    }

    /// Reads a static field.
    pub fn get_field(&self, name: &str) -> Result<Value> {
        let field = self.static_field(name)?;
        read_field(&self.session, field, FieldTarget::Static(self.handle.raw()?))
    }

    /// Writes a static field.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let field = self.static_field(name)?;
        write_field(&self.session, field, FieldTarget::Static(self.handle.raw()?), &value.into())
    }

    /// Constructs an instance, choosing the constructor by the arguments.
    pub fn new_instance(&self, args: &[Value]) -> Result<Value> {
        BoundCallable::new(&self.session, &self.class, self.class.constructors(), Dispatch::Constructor).invoke(args)
    }

    pub fn is_same(&self, other: &ProxyClass) -> Result<bool> {
        self.session.registry().identity_equal(&self.handle, &other.handle)
    }

    fn static_field(&self, name: &str) -> Result<&Arc<FieldDescriptor>> {
        self.class
            .field(name)
            .filter(|f| f.is_static)
            .ok_or_else(|| not_found(&self.class, name))
    }

    /// A class-level callable: statics, explicit receiver, then the metaclass.
    fn unbound(&self, group: &Arc<MethodGroup>) -> Result<BoundCallable> {
        let meta = self
            .session
            .describe(CLASS)?
            .method(&group.name)
            .filter(|g| g.has_instance())
            .map(|g| (Arc::new(g.instance_only()), self.clone()));
        Ok(BoundCallable::new(&self.session, &self.class, group, Dispatch::Unbound { meta }))
    }
}

impl PartialEq for ProxyClass {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other).unwrap_or(false)
    }
}

impl fmt::Debug for ProxyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProxyClass({} {})", self.class.name(), self.handle.key())
    }
}

#[derive(Clone)]
enum Dispatch {
    Constructor,
    Bound(Value),
    /// Accessed through a class. `meta` is the same-named instance group of
    /// `java.lang.Class` with the class object to bind it to.
    Unbound { meta: Option<(Arc<MethodGroup>, ProxyClass)> },
}

/// A method group ready to invoke. Built per attribute access.
#[derive(Clone)]
pub struct BoundCallable {
    session: Session,
    class: Arc<ClassDescriptor>,
    group: Arc<MethodGroup>,
    dispatch: Dispatch,
}

impl BoundCallable {
    fn new(session: &Session, class: &Arc<ClassDescriptor>, group: &Arc<MethodGroup>, dispatch: Dispatch) -> Self {
        Self {
            session: session.clone(),
            class: Arc::clone(class),
            group: Arc::clone(group),
            dispatch,
        }
    }

    pub fn name(&self) -> &str {
        &self.group.name
    }

    pub fn group(&self) -> &Arc<MethodGroup> {
        &self.group
    }

    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        match &self.dispatch {
            Dispatch::Constructor => {
                let overload = self.pick(&self.group, false, args)?;
                self.run(overload, None, args)
            }
            Dispatch::Bound(receiver) => self.invoke_bound(receiver, args),
            Dispatch::Unbound { meta } => self.invoke_unbound(meta.as_ref(), args),
        }
    }

    fn pick<'g>(&self, group: &'g MethodGroup, receiver_present: bool, args: &[Value]) -> Result<&'g Overload> {
        resolve(group, receiver_present, args, self.session.cache())?.map_err(|f| self.no_match(args, f))
    }

    fn no_match(&self, args: &[Value], failure: MatchFailure) -> Error {
        Error::NoMatchingOverload {
            class: self.class.name().to_string(),
            method: self.group.name.clone(),
            args: args.iter().map(Value::type_name).collect::<Vec<_>>().join(", "),
            failure,
        }
    }

    /// Instance overloads on the receiver; static ones when the group has
    /// nothing else of that arity.
    fn invoke_bound(&self, receiver: &Value, args: &[Value]) -> Result<Value> {
        match resolve(&self.group, true, args, self.session.cache())? {
            Ok(overload) => self.run(overload, Some(receiver), args),
            Err(MatchFailure::NoCandidates) if self.group.has_static() => {
                let overload = self.pick(&self.group, false, args)?;
                self.run(overload, None, args)
            }
            Err(failure) => Err(self.no_match(args, failure)),
        }
    }

    fn invoke_unbound(&self, meta: Option<&(Arc<MethodGroup>, ProxyClass)>, args: &[Value]) -> Result<Value> {
        let cache = self.session.cache();
        let mut worst = MatchFailure::NoCandidates;

        match resolve(&self.group, false, args, cache)? {
            Ok(overload) => return self.run(overload, None, args),
            Err(failure @ MatchFailure::Ambiguous(_)) => return Err(self.no_match(args, failure)),
            Err(failure) => worst = worst.max(failure),
        }

        if let Some((receiver, rest)) = args.split_first() {
            if self.group.has_instance() {
                if !self.accepts_receiver(receiver)? {
                    worst = worst.max(MatchFailure::Rejected);
                } else {
                    match resolve(&self.group, true, rest, cache)? {
                        Ok(overload) => return self.run(overload, Some(receiver), rest),
                        Err(failure @ MatchFailure::Ambiguous(_)) => return Err(self.no_match(args, failure)),
                        Err(failure) => worst = worst.max(failure),
                    }
                }
            }
        }

        if let Some((group, class)) = meta {
            let receiver = Value::Class(class.clone());
            match resolve(group, true, args, cache)? {
                Ok(overload) => return self.run(overload, Some(&receiver), args),
                Err(failure @ MatchFailure::Ambiguous(_)) => return Err(self.no_match(args, failure)),
                Err(failure) => worst = worst.max(failure),
            }
        }

        Err(self.no_match(args, worst))
    }

    fn accepts_receiver(&self, value: &Value) -> Result<bool> {
        let name = self.class.name();
        Ok(match value {
            Value::Object(o) => o.class().is_subclass_of(name),
            Value::Str(_) => self.session.cache().distance(STRING, name)?.is_some(),
            Value::Class(_) => self.session.cache().distance(CLASS, name)?.is_some(),
            _ => false,
        })
    }

    /// Marshals, invokes and brings the result home.
    fn run(&self, overload: &Overload, receiver: Option<&Value>, args: &[Value]) -> Result<Value> {
        let session = &self.session;
        let runtime = session.runtime();
        let mut scope = Scope::new(session.registry());

        let mut foreign = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&overload.params) {
            foreign.push(marshal::to_foreign(arg, param, session, &mut scope)?);
        }

        let outcome = match (&self.dispatch, receiver) {
            (Dispatch::Constructor, _) => runtime
                .new_object(self.class.handle().raw()?, overload.id, &foreign)
                .map(|obj| ForeignValue::Ref(Some(obj))),
            (_, Some(receiver)) => {
                let obj = receiver_ref(receiver, session, &mut scope)?;
                runtime.call_method(obj, overload.id, &foreign)
            }
            (_, None) => runtime.call_static(self.class.handle().raw()?, overload.id, &foreign),
        };
        let value = outcome.map_err(|e| foreign_failure(session, e))?;
        marshal::to_local(value, &overload.ret, session)
    }
}

impl fmt::Debug for BoundCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundCallable({}.{}, {} overloads)", self.class.name(), self.group.name, self.group.overloads.len())
    }
}

fn receiver_ref(receiver: &Value, session: &Session, scope: &mut Scope) -> Result<RawRef> {
    match receiver {
        Value::Object(o) => o.handle().raw(),
        Value::Class(c) => c.handle().raw(),
        Value::Str(s) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            let raw = session.runtime().new_string(&units)?;
            Ok(scope.adopt(raw, HandleKind::Object))
        }
        other => Err(Error::type_error("object receiver", other.type_name())),
    }
}

fn read_field(session: &Session, field: &FieldDescriptor, target: FieldTarget) -> Result<Value> {
    let value = session
        .runtime()
        .get_field(target, field.id)
        .map_err(|e| foreign_failure(session, e))?;
    marshal::to_local(value, &field.ty, session)
}

fn write_field(session: &Session, field: &FieldDescriptor, target: FieldTarget, value: &Value) -> Result<()> {
    let mut scope = Scope::new(session.registry());
    let foreign = marshal::to_foreign(value, &field.ty, session, &mut scope)?;
    session
        .runtime()
        .set_field(target, field.id, foreign)
        .map_err(|e| foreign_failure(session, e))
}

/// Turns a thrown foreign exception into [`Error::ForeignException`].
pub(crate) fn foreign_failure(session: &Session, err: ForeignError) -> Error {
    let ForeignError::Thrown(raw) = err else {
        return Error::Foreign(err);
    };
    let exception = match marshal::to_local(ForeignValue::Ref(Some(raw)), &TypeSig::object(THROWABLE), session) {
        Ok(Value::Object(exception)) => exception,
        Ok(other) => return Error::type_error(THROWABLE, other.type_name()),
        Err(e) => return e,
    };
    let message = exception_message(&exception);
    tracing::debug!(class = %exception.class().name(), ?message, "foreign exception");
    Error::ForeignException {
        class: exception.class().name().to_string(),
        message,
        exception,
    }
}

/// `getMessage()` straight through the runtime. A failure here yields no
/// message rather than another exception.
fn exception_message(exception: &ProxyObject) -> Option<String> {
    let session = exception.session();
    let overload = exception
        .class()
        .method("getMessage")?
        .overloads
        .iter()
        .find(|o| !o.is_static && o.params.is_empty())?;
    let receiver = exception.handle().raw().ok()?;

    match session.runtime().call_method(receiver, overload.id, &[]) {
        Ok(ForeignValue::Ref(Some(s))) => {
            let _owned = session.registry().wrap(s, HandleKind::Object);
            let units = session.runtime().string_utf16(s).ok()?;
            // Unpaired surrogates become U+FFFD rather than hiding the exception.
            Some(String::from_utf16_lossy(&units))
        }
        Ok(_) => None,
        Err(ForeignError::Thrown(nested)) => {
            drop(session.registry().wrap(nested, HandleKind::Object));
            None
        }
        Err(_) => None,
    }
}
