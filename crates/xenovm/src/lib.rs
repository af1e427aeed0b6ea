//! # Xenovm
//!
//! A small managed object runtime that speaks the `xenoabi` reflection and
//! invocation interface.
//!
//! It has single inheritance with interfaces, overloaded native methods,
//! static and instance fields, UTF-16 strings, throwables, a reference table
//! and per-thread attachment. The bundled class library mirrors the parts of
//! `java.lang`, `java.util` and `java.awt` that clients of the interface
//! usually reach for first.
//!
//! ## Philosophy
//!
//! - **Checked boundary**: every argument crossing the interface is checked
//!   against the declared parameter types, so marshaling bugs in a client
//!   show up as errors rather than odd results.
//! - **Observable bookkeeping**: live references and invocation counts are
//!   exposed so clients can assert they release what they take and stay off
//!   the runtime when they should.

pub mod class;
pub mod heap;
pub mod launcher;
mod rt;
pub mod vm;

pub use class::ClassBuilder;
pub use class::ClassId;
pub use class::DefineError;
pub use heap::ObjId;
pub use heap::Payload;
pub use heap::Slot;
pub use launcher::VmLauncher;
pub use vm::Ctx;
pub use vm::Throw;
pub use vm::Vm;
pub use vm::VmOptions;

pub const OBJECT: &str = "java.lang.Object";
pub const CLASS: &str = "java.lang.Class";
pub const STRING: &str = "java.lang.String";

#[cfg(test)]
mod tests;
