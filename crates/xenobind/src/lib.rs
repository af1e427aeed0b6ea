//! # Xenobind
//!
//! Proxies for the objects and classes of a foreign managed runtime.
//!
//! The runtime is reachable only through its native reflection and invocation
//! interface ([`xenoabi::ForeignRuntime`]). Xenobind mirrors foreign classes
//! as local [`ProxyClass`]es, foreign objects as [`ProxyObject`]s, and turns
//! attribute access and calls into reflected, overload-resolved, marshaled
//! invocations.
//!
//! ```ignore
//! let session = xenobind::start(&launcher, &StartConfig::new(library))?;
//! let math = session.get_class("java.lang.Math")?;
//! let one = math.call("sin", &[Value::Double(std::f64::consts::FRAC_PI_2)])?;
//! ```
//!
//! ## Philosophy
//!
//! - **Reflect once**: each class is described once per session and the
//!   description is shared by every proxy of that class.
//! - **Resolve every time**: the overload is chosen per call from the
//!   argument kinds; a tie is an error, never a guess.
//! - **Own every reference**: each foreign reference the bridge touches sits
//!   in the [`HandleRegistry`] and is released exactly once.
//! - **Identity is foreign**: two proxies are the same object only if the
//!   runtime says so.
//!
//! ## Layout
//!
//! - [`handles`] - handle registry and scoped temporaries
//! - [`reflect`] - class descriptors and the reflection cache
//! - [`marshal`] - value conversion in both directions
//! - [`resolve`] - overload resolution
//! - [`proxy`] - object and class proxies, bound callables
//! - [`session`] - the runtime binding and the process-wide `start`

pub mod config;
pub mod error;
pub mod handles;
pub mod marshal;
pub mod proxy;
pub mod reflect;
pub mod resolve;
pub mod session;
pub mod value;

pub use config::StartConfig;
pub use error::Error;
pub use error::Result;
pub use handles::Handle;
pub use handles::HandleKey;
pub use handles::HandleKind;
pub use handles::HandleRegistry;
pub use handles::Scope;
pub use marshal::Conversion;
pub use proxy::Attribute;
pub use proxy::BoundCallable;
pub use proxy::ProxyClass;
pub use proxy::ProxyObject;
pub use reflect::ClassDescriptor;
pub use reflect::FieldDescriptor;
pub use reflect::MethodGroup;
pub use reflect::Overload;
pub use reflect::ReflectionCache;
pub use reflect::TypeOracle;
pub use resolve::MatchFailure;
pub use session::AttachGuard;
pub use session::Session;
pub use session::session;
pub use session::start;
pub use value::Value;

pub(crate) const OBJECT: &str = "java.lang.Object";
pub(crate) const CLASS: &str = "java.lang.Class";
pub(crate) const STRING: &str = "java.lang.String";
pub(crate) const THROWABLE: &str = "java.lang.Throwable";
