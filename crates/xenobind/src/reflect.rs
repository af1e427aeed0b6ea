//! # Reflection Cache
//!
//! Describes foreign classes once and keeps the result for the session.
//!
//! A [`ClassDescriptor`] holds the full member table of a class: its own
//! members plus everything inherited, merged by name, so that dispatch never
//! has to walk the hierarchy again.
//!
//! ## Invariants
//!
//! - Keys are dotted class names. Slashed names are accepted and normalized.
//! - A descriptor is immutable once built and is never evicted.
//! - A failed build leaves no entry behind.
//! - Building is exclusive per class name: concurrent `describe` calls for
//!   one class wait on a single [`OnceCell`], while unrelated classes build
//!   in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use xenoabi::FieldId;
use xenoabi::ForeignRuntime;
use xenoabi::MethodId;
use xenoabi::TypeSig;
use xenoabi::sig::dotted;

use crate::OBJECT;
use crate::error::Error;
use crate::error::Result;
use crate::handles::Handle;
use crate::handles::HandleKind;
use crate::handles::HandleRegistry;
use crate::handles::Scope;

/// One invocable signature of a method or constructor.
#[derive(Clone, Debug, PartialEq)]
pub struct Overload {
    pub id: MethodId,
    /// Constructors are static: they take no receiver.
    pub is_static: bool,
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
    pub declaring_class: String,
}

/// Every overload reachable under one name.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodGroup {
    pub name: String,
    pub overloads: Vec<Overload>,
}

impl MethodGroup {
    pub fn has_static(&self) -> bool {
        self.overloads.iter().any(|o| o.is_static)
    }

    pub fn has_instance(&self) -> bool {
        self.overloads.iter().any(|o| !o.is_static)
    }

    /// The same group without its static overloads.
    pub fn instance_only(&self) -> MethodGroup {
        MethodGroup {
            name: self.name.clone(),
            overloads: self.overloads.iter().filter(|o| !o.is_static).cloned().collect(),
        }
    }

    /// Adds an overload, replacing one with the same staticness and parameters.
    fn merge(&mut self, overload: Overload) {
        match self
            .overloads
            .iter_mut()
            .find(|o| o.is_static == overload.is_static && o.params == overload.params)
        {
            Some(existing) => *existing = overload,
            None => self.overloads.push(overload),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeSig,
    pub is_static: bool,
    pub id: FieldId,
    pub declaring_class: String,
}

/// The reflected shape of one foreign class.
pub struct ClassDescriptor {
    name: String,
    handle: Arc<Handle>,
    superclass: Option<Arc<ClassDescriptor>>,
    interfaces: Vec<Arc<ClassDescriptor>>,
    is_interface: bool,
    methods: IndexMap<String, Arc<MethodGroup>>,
    fields: IndexMap<String, Arc<FieldDescriptor>>,
    constructors: Arc<MethodGroup>,
    /// Every ancestor (including the class itself at 0) by shortest distance.
    ancestors: HashMap<String, u32>,
}

impl ClassDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class object this descriptor was built from.
    pub fn handle(&self) -> &Arc<Handle> {
        &self.handle
    }

    pub fn superclass(&self) -> Option<&Arc<ClassDescriptor>> {
        self.superclass.as_ref()
    }

    pub fn interfaces(&self) -> &[Arc<ClassDescriptor>] {
        &self.interfaces
    }

    pub fn is_interface(&self) -> bool {
        self.is_interface
    }

    pub fn method(&self, name: &str) -> Option<&Arc<MethodGroup>> {
        self.methods.get(name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodGroup>> {
        self.methods.values()
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &Arc<FieldDescriptor>> {
        self.fields.values()
    }

    pub fn constructors(&self) -> &Arc<MethodGroup> {
        &self.constructors
    }

    /// Inheritance steps from this class up to `ancestor`, if it is one.
    pub fn distance_to(&self, ancestor: &str) -> Option<u32> {
        self.ancestors.get(ancestor).copied()
    }

    pub fn is_subclass_of(&self, ancestor: &str) -> bool {
        self.ancestors.contains_key(ancestor)
    }
}

impl std::fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .field("fields", &self.fields.len())
            .field("constructors", &self.constructors.overloads.len())
            .finish()
    }
}

/// Answers "how far is class `from` from type `to`" for conversion scoring.
pub trait TypeOracle {
    /// `Some(0)` when equal, `Some(d)` when `to` is an ancestor `d` steps up,
    /// `None` when `from` is not assignable to `to`. Failing to reflect on
    /// `from` is an error, not a rejection.
    fn distance(&self, from: &str, to: &str) -> Result<Option<u32>>;
}

type Cell = Arc<OnceCell<Arc<ClassDescriptor>>>;

pub struct ReflectionCache {
    runtime: Arc<dyn ForeignRuntime>,
    registry: Arc<HandleRegistry>,
    classes: DashMap<String, Cell>,
}

impl ReflectionCache {
    pub fn new(runtime: Arc<dyn ForeignRuntime>, registry: Arc<HandleRegistry>) -> Self {
        Self {
            runtime,
            registry,
            classes: DashMap::new(),
        }
    }

    /// Describes a class, building and caching it on first use.
    pub fn describe(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        let key = dotted(name);
        // Clone the cell out so no shard lock is held while building; the
        // build recurses into describe for superclasses and interfaces.
        let cell: Cell = self.classes.entry(key.clone()).or_default().clone();
        let result = cell.get_or_try_init(|| self.build(&key)).cloned();
        if result.is_err() {
            self.classes.remove_if(&key, |_, c| c.get().is_none());
        }
        result
    }

    /// Whether a finished descriptor for `name` is cached.
    pub fn is_cached(&self, name: &str) -> bool {
        self.classes.get(&dotted(name)).is_some_and(|c| c.get().is_some())
    }

    pub fn len(&self) -> usize {
        self.classes.iter().filter(|c| c.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        let runtime = &self.runtime;
        let raw = runtime.find_class(name)?.ok_or_else(|| Error::ClassNotFound(name.to_string()))?;
        let handle = Arc::new(self.registry.wrap(raw, HandleKind::Class));
        let mut scope = Scope::new(&self.registry);

        let is_interface = runtime.is_interface(raw)?;
        let superclass = match runtime.superclass(raw)? {
            Some(s) => {
                let s = scope.adopt(s, HandleKind::Class);
                Some(self.describe(&runtime.class_name(s)?)?)
            }
            None => None,
        };
        let mut interfaces = Vec::new();
        for i in scope.adopt_all(runtime.interfaces(raw)?, HandleKind::Class) {
            interfaces.push(self.describe(&runtime.class_name(i)?)?);
        }

        let mut declared_methods = Vec::new();
        for m in scope.adopt_all(runtime.declared_methods(raw)?, HandleKind::Method) {
            let info = runtime.method_info(m)?;
            let overload = Overload {
                id: info.id,
                is_static: info.is_static,
                params: info.params,
                ret: info.ret,
                declaring_class: name.to_string(),
            };
            declared_methods.push((info.name, overload));
        }
        let mut constructors = MethodGroup {
            name: "<init>".to_string(),
            overloads: Vec::new(),
        };
        for c in scope.adopt_all(runtime.declared_constructors(raw)?, HandleKind::Method) {
            let info = runtime.method_info(c)?;
            constructors.overloads.push(Overload {
                id: info.id,
                is_static: true,
                params: info.params,
                ret: TypeSig::Object(name.to_string()),
                declaring_class: name.to_string(),
            });
        }
        let mut declared_fields = Vec::new();
        for f in scope.adopt_all(runtime.declared_fields(raw)?, HandleKind::Field) {
            let info = runtime.field_info(f)?;
            declared_fields.push(FieldDescriptor {
                name: info.name,
                ty: info.ty,
                is_static: info.is_static,
                id: info.id,
                declaring_class: name.to_string(),
            });
        }

        // Interfaces first, so a superclass implementation replaces the
        // abstract interface overload rather than sitting beside it.
        let mut groups: IndexMap<String, MethodGroup> = IndexMap::new();
        let mut fields: IndexMap<String, Arc<FieldDescriptor>> = IndexMap::new();
        for parent in &interfaces {
            for group in parent.methods.values() {
                for o in group.overloads.iter().filter(|o| !o.is_static) {
                    merge_into(&mut groups, &group.name, o.clone());
                }
            }
            for field in parent.fields.values().filter(|f| f.is_static) {
                fields.insert(field.name.clone(), Arc::clone(field));
            }
        }
        if let Some(parent) = &superclass {
            for group in parent.methods.values() {
                for o in &group.overloads {
                    merge_into(&mut groups, &group.name, o.clone());
                }
            }
            for field in parent.fields.values() {
                fields.insert(field.name.clone(), Arc::clone(field));
            }
        }
        for (method, o) in declared_methods {
            merge_into(&mut groups, &method, o);
        }
        for field in declared_fields {
            fields.insert(field.name.clone(), Arc::new(field));
        }

        let mut ancestors = HashMap::from([(name.to_string(), 0)]);
        for parent in superclass.iter().chain(&interfaces) {
            for (ancestor, d) in &parent.ancestors {
                let entry = ancestors.entry(ancestor.clone()).or_insert(d + 1);
                *entry = (*entry).min(d + 1);
            }
        }
        if is_interface {
            ancestors.entry(OBJECT.to_string()).or_insert(1);
        }

        tracing::debug!(
            class = %name,
            methods = groups.len(),
            fields = fields.len(),
            constructors = constructors.overloads.len(),
            "described class"
        );

        Ok(Arc::new(ClassDescriptor {
            name: name.to_string(),
            handle,
            superclass,
            interfaces,
            is_interface,
            methods: groups.into_iter().map(|(k, g)| (k, Arc::new(g))).collect(),
            fields,
            constructors: Arc::new(constructors),
            ancestors,
        }))
    }
}

fn merge_into(groups: &mut IndexMap<String, MethodGroup>, name: &str, overload: Overload) {
    groups
        .entry(name.to_string())
        .or_insert_with(|| MethodGroup {
            name: name.to_string(),
            overloads: Vec::new(),
        })
        .merge(overload);
}

impl TypeOracle for ReflectionCache {
    fn distance(&self, from: &str, to: &str) -> Result<Option<u32>> {
        if from == to {
            return Ok(Some(0));
        }
        Ok(self.describe(from)?.distance_to(to))
    }
}
