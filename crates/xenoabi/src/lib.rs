//! # Xenoabi
//!
//! The native reflection and invocation interface of a foreign managed object
//! runtime, expressed as a Rust trait.
//!
//! Everything that crosses the boundary is either a primitive value or an
//! opaque [`RawRef`]. A `RawRef` is a slot in the runtime's reference table:
//! it keeps its target alive until [`ForeignRuntime::delete_ref`] is called,
//! and every reference the runtime hands out is a fresh slot owned by the
//! caller.
//!
//! ## Invariants
//!
//! - Class names at this interface are dotted (`java.lang.String`).
//! - Method and field ids are stable for the lifetime of the runtime.
//! - Two refs may name the same object; only [`ForeignRuntime::is_same_object`]
//!   decides identity.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

pub mod sig;

pub use sig::PrimitiveKind;
pub use sig::TypeSig;

/// A slot in the foreign runtime's reference table.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct RawRef(pub u64);

impl std::fmt::Display for RawRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref-{}", self.0)
    }
}

/// Invocation id of a method or constructor.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct MethodId(pub u64);

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "method-{:x}", self.0)
    }
}

/// Access id of a static or instance field.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct FieldId(pub u64);

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field-{:x}", self.0)
    }
}

/// What a reference points at, as reported by the runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RefKind {
    Instance,
    Class,
    /// A reflected method or constructor.
    Method,
    /// A reflected field.
    Field,
}

/// A value as it crosses the boundary.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ForeignValue {
    Void,
    Boolean(bool),
    Byte(i8),
    /// One UTF-16 code unit.
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// `None` is the null reference.
    Ref(Option<RawRef>),
}

impl ForeignValue {
    pub const NULL: ForeignValue = ForeignValue::Ref(None);

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            ForeignValue::Boolean(_) => PrimitiveKind::Boolean,
            ForeignValue::Byte(_) => PrimitiveKind::Byte,
            ForeignValue::Char(_) => PrimitiveKind::Char,
            ForeignValue::Short(_) => PrimitiveKind::Short,
            ForeignValue::Int(_) => PrimitiveKind::Int,
            ForeignValue::Long(_) => PrimitiveKind::Long,
            ForeignValue::Float(_) => PrimitiveKind::Float,
            ForeignValue::Double(_) => PrimitiveKind::Double,
            ForeignValue::Void | ForeignValue::Ref(_) => return None,
        })
    }

    /// Whether this value has the shape `ty` asks for. Reference values are
    /// only checked for being references.
    pub fn fits(&self, ty: &TypeSig) -> bool {
        match (self, ty) {
            (ForeignValue::Void, TypeSig::Void) => true,
            (ForeignValue::Ref(_), TypeSig::Object(_)) => true,
            (value, TypeSig::Primitive(kind)) => value.primitive_kind() == Some(*kind),
            _ => false,
        }
    }
}

/// Reflected description of a method or constructor.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodInfo {
    pub id: MethodId,
    /// `<init>` for constructors.
    pub name: String,
    pub is_static: bool,
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
}

/// Reflected description of a field.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo {
    pub id: FieldId,
    pub name: String,
    pub is_static: bool,
    pub ty: TypeSig,
}

/// Where a field lives: on a class (static) or on an instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldTarget {
    Static(RawRef),
    Instance(RawRef),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForeignError {
    /// The invoked code threw. The ref names the throwable and is owned by the caller.
    #[error("foreign code threw ({0})")]
    Thrown(RawRef),
    #[error("invalid reference: {0}")]
    InvalidRef(RawRef),
    #[error("invalid method id: {0}")]
    InvalidMethod(MethodId),
    #[error("invalid field id: {0}")]
    InvalidField(FieldId),
    /// The runtime refused the arguments of an otherwise valid call.
    #[error("bad arguments: {0}")]
    BadArguments(String),
    #[error("malformed type descriptor: {0:?}")]
    BadDescriptor(String),
    #[error("calling thread is not attached to the foreign runtime")]
    NotAttached,
}

pub type Result<T> = std::result::Result<T, ForeignError>;

/// The reflection and invocation surface of a running foreign runtime.
///
/// Calls that run foreign code or read foreign state require the calling
/// thread to be attached. Reference bookkeeping (`new_ref`, `delete_ref`,
/// `is_same_object`) is allowed from any thread so that finalization can
/// happen anywhere.
pub trait ForeignRuntime: Send + Sync {
    // --- Classes ---

    /// Looks up a class by dotted name. `Ok(None)` if there is no such class.
    fn find_class(&self, name: &str) -> Result<Option<RawRef>>;
    fn class_name(&self, class: RawRef) -> Result<String>;
    fn superclass(&self, class: RawRef) -> Result<Option<RawRef>>;
    fn interfaces(&self, class: RawRef) -> Result<Vec<RawRef>>;
    fn is_interface(&self, class: RawRef) -> Result<bool>;

    // --- Reflection ---

    /// Reflected methods declared by the class itself, static and instance.
    fn declared_methods(&self, class: RawRef) -> Result<Vec<RawRef>>;
    fn declared_constructors(&self, class: RawRef) -> Result<Vec<RawRef>>;
    fn declared_fields(&self, class: RawRef) -> Result<Vec<RawRef>>;
    fn method_info(&self, method: RawRef) -> Result<MethodInfo>;
    fn field_info(&self, field: RawRef) -> Result<FieldInfo>;

    // --- Objects and references ---

    fn ref_kind(&self, obj: RawRef) -> Result<RefKind>;
    /// The dynamic class of an object.
    fn object_class(&self, obj: RawRef) -> Result<RawRef>;
    fn is_same_object(&self, a: RawRef, b: RawRef) -> Result<bool>;
    fn new_ref(&self, obj: RawRef) -> Result<RawRef>;
    fn delete_ref(&self, obj: RawRef) -> Result<()>;

    // --- Invocation ---

    fn new_object(&self, class: RawRef, ctor: MethodId, args: &[ForeignValue]) -> Result<RawRef>;
    fn call_static(&self, class: RawRef, method: MethodId, args: &[ForeignValue]) -> Result<ForeignValue>;
    /// Virtual call: the override is selected from the receiver's dynamic class.
    fn call_method(&self, obj: RawRef, method: MethodId, args: &[ForeignValue]) -> Result<ForeignValue>;
    fn get_field(&self, target: FieldTarget, field: FieldId) -> Result<ForeignValue>;
    fn set_field(&self, target: FieldTarget, field: FieldId, value: ForeignValue) -> Result<()>;

    // --- Strings ---

    fn new_string(&self, utf16: &[u16]) -> Result<RawRef>;
    fn string_utf16(&self, s: RawRef) -> Result<Vec<u16>>;

    // --- Threads ---

    /// `true` when this call attached the thread, `false` when it already was.
    fn attach_current_thread(&self) -> Result<bool>;
    fn detach_current_thread(&self) -> Result<()>;
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("runtime library not found at {0}")]
    LibraryNotFound(PathBuf),
    #[error("runtime rejected startup: {0}")]
    Rejected(String),
}

/// Loads and initializes a foreign runtime from a native library.
pub trait Launcher {
    fn launch(&self, library: &Path, options: &[String]) -> std::result::Result<Arc<dyn ForeignRuntime>, LaunchError>;
}
