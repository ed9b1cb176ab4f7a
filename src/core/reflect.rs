//! Reflection tables
//!
//! Host types register their fields, properties and methods once at startup.
//! Member lookup walks the registered hierarchy from the most-derived type
//! to its bases and stops at the first match; at each level a field beats a
//! property of the same name.
//!
//! ```ignore
//! let mut types = TypeRegistry::new();
//! types.define::<Lamp>("Lamp")
//!     .base("Object")
//!     .field("on", ValueType::Bool, |l| Value::Bool(l.on.get()), |l, v| { ... })
//!     .property("watts", ValueType::Int, |l| Value::Int(l.watts))
//!     .method("toggle", vec![], |l, _| { ... })
//!     .finish();
//! ```

use crate::core::value::{HostObject, ObjectRef, Value};
use crate::error::{BridgeError, BridgeResult};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Native type a setter or parameter expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Float,
    String,
    Wire,
    Array(Box<ValueType>),
    List(Box<ValueType>),
    Map(Box<ValueType>),
    /// Reference to a registered host object
    Object,
    /// Host-specific type with a registered converter (e.g. "Vector3")
    Named(String),
}

impl ValueType {
    pub fn named(name: impl Into<String>) -> Self {
        ValueType::Named(name.into())
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "any"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::String => write!(f, "string"),
            ValueType::Wire => write!(f, "wire"),
            ValueType::Array(t) => write!(f, "array<{}>", t),
            ValueType::List(t) => write!(f, "list<{}>", t),
            ValueType::Map(t) => write!(f, "map<{}>", t),
            ValueType::Object => write!(f, "object"),
            ValueType::Named(n) => write!(f, "{}", n),
        }
    }
}

type Getter = Box<dyn Fn(&dyn HostObject) -> BridgeResult<Value>>;
type Setter = Box<dyn Fn(&dyn HostObject, Value) -> BridgeResult<()>>;
type Invoker = Box<dyn Fn(&ObjectRef, Vec<Value>) -> BridgeResult<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
}

/// Which member kinds a lookup accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberSearch {
    Any,
    Only(MemberKind),
}

pub struct MemberDesc {
    pub name: String,
    pub kind: MemberKind,
    pub ty: ValueType,
    /// Type that declared the member (may be a base of the owner's type)
    pub declared_on: String,
    get: Getter,
    set: Option<Setter>,
}

impl MemberDesc {
    pub fn get(&self, owner: &dyn HostObject) -> BridgeResult<Value> {
        (self.get)(owner)
    }

    pub fn set(&self, owner: &dyn HostObject, value: Value) -> BridgeResult<()> {
        match &self.set {
            Some(set) => set(owner, value),
            None => Err(BridgeError::Invocation(format!(
                "{}.{} has no setter",
                self.declared_on, self.name
            ))),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }
}

impl fmt::Debug for MemberDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDesc")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("ty", &self.ty)
            .field("declared_on", &self.declared_on)
            .finish()
    }
}

/// A callable member.
///
/// `params` lists every declared parameter. Static methods (including
/// extensions) take the owner as their first parameter; callers supply it.
pub struct MethodDesc {
    pub name: String,
    pub params: Vec<ValueType>,
    pub is_static: bool,
    invoke: Invoker,
}

impl MethodDesc {
    pub fn invoke(&self, owner: &ObjectRef, args: Vec<Value>) -> BridgeResult<Value> {
        if args.len() != self.params.len() {
            return Err(BridgeError::Invocation(format!(
                "{} expects {} arguments, got {}",
                self.name,
                self.params.len(),
                args.len()
            )));
        }
        (self.invoke)(owner, args)
    }

    /// Parameters the caller provides explicitly.
    pub fn explicit_params(&self) -> &[ValueType] {
        if self.is_static && !self.params.is_empty() {
            &self.params[1..]
        } else {
            &self.params
        }
    }
}

impl fmt::Debug for MethodDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDesc")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("is_static", &self.is_static)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct TypeDesc {
    pub name: String,
    pub base: Option<String>,
    fields: IndexMap<String, Rc<MemberDesc>>,
    properties: IndexMap<String, Rc<MemberDesc>>,
    methods: IndexMap<String, Vec<Rc<MethodDesc>>>,
}

struct Extension {
    target: String,
    method: Rc<MethodDesc>,
}

#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDesc>,
    extensions: HashMap<String, Vec<Extension>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start describing the host type `T`, registered as `name`.
    pub fn define<T: 'static>(&mut self, name: &str) -> TypeBuilder<'_, T> {
        TypeBuilder {
            registry: self,
            desc: TypeDesc { name: name.to_string(), ..TypeDesc::default() },
            _marker: PhantomData,
        }
    }

    /// Register a static method callable on any object whose hierarchy
    /// includes `target`. The owner is passed as the first argument, so
    /// `params[0]` describes it.
    pub fn extension<F>(&mut self, target: &str, name: &str, params: Vec<ValueType>, f: F)
    where
        F: Fn(Vec<Value>) -> BridgeResult<Value> + 'static,
    {
        let method = MethodDesc {
            name: name.to_string(),
            params,
            is_static: true,
            invoke: Box::new(move |_, args| f(args)),
        };
        self.extensions.entry(name.to_string()).or_default().push(Extension {
            target: target.to_string(),
            method: Rc::new(method),
        });
    }

    pub fn get(&self, name: &str) -> Option<&TypeDesc> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// `name` followed by its registered bases, most-derived first.
    pub fn hierarchy(&self, name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(ty) = current {
            if chain.contains(&ty) || chain.len() > self.types.len() {
                break;
            }
            current = self.types.get(&ty).and_then(|d| d.base.clone());
            chain.push(ty);
        }
        chain
    }

    pub fn is_a(&self, name: &str, base: &str) -> bool {
        self.hierarchy(name).iter().any(|t| t == base)
    }

    pub fn find_member(&self, type_name: &str, member: &str, search: MemberSearch) -> Option<Rc<MemberDesc>> {
        for ty in self.hierarchy(type_name) {
            let Some(desc) = self.types.get(&ty) else { continue };
            let field = desc.fields.get(member);
            let property = desc.properties.get(member);
            let found = match search {
                MemberSearch::Any => field.or(property),
                MemberSearch::Only(MemberKind::Field) => field,
                MemberSearch::Only(MemberKind::Property) => property,
            };
            if let Some(found) = found {
                return Some(found.clone());
            }
        }
        None
    }

    /// First overload of `method` found on the hierarchy matching `filter`.
    pub fn find_method(
        &self,
        type_name: &str,
        method: &str,
        filter: impl Fn(&MethodDesc) -> bool,
    ) -> Option<Rc<MethodDesc>> {
        self.hierarchy(type_name).iter().find_map(|ty| {
            self.types
                .get(ty)
                .and_then(|d| d.methods.get(method))
                .and_then(|overloads| overloads.iter().find(|m| filter(m)).cloned())
        })
    }

    pub fn find_extension(&self, type_name: &str, method: &str) -> Option<Rc<MethodDesc>> {
        let candidates = self.extensions.get(method)?;
        let chain = self.hierarchy(type_name);
        chain.iter().find_map(|ty| {
            candidates.iter().find(|e| &e.target == ty).map(|e| e.method.clone())
        })
    }
}

/// Downcast an owner to the Rust type registered as `type_name`.
fn view<'a, T: 'static>(owner: &'a dyn HostObject, type_name: &str) -> BridgeResult<&'a T> {
    owner
        .view(type_name)
        .and_then(|any| any.downcast_ref::<T>())
        .ok_or_else(|| {
            BridgeError::TypeMismatch(format!("{} is not a {}", owner.type_name(), type_name))
        })
}

pub struct TypeBuilder<'r, T> {
    registry: &'r mut TypeRegistry,
    desc: TypeDesc,
    _marker: PhantomData<fn(&T)>,
}

impl<'r, T: 'static> TypeBuilder<'r, T> {
    pub fn base(mut self, name: &str) -> Self {
        self.desc.base = Some(name.to_string());
        self
    }

    pub fn field<G, S>(self, name: &str, ty: ValueType, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + 'static,
        S: Fn(&T, Value) -> BridgeResult<()> + 'static,
    {
        self.member(name, MemberKind::Field, ty, get, Some(set))
    }

    /// Read-only property.
    pub fn property<G>(self, name: &str, ty: ValueType, get: G) -> Self
    where
        G: Fn(&T) -> Value + 'static,
    {
        self.member::<G, fn(&T, Value) -> BridgeResult<()>>(name, MemberKind::Property, ty, get, None)
    }

    pub fn property_rw<G, S>(self, name: &str, ty: ValueType, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Value + 'static,
        S: Fn(&T, Value) -> BridgeResult<()> + 'static,
    {
        self.member(name, MemberKind::Property, ty, get, Some(set))
    }

    pub fn method<F>(mut self, name: &str, params: Vec<ValueType>, f: F) -> Self
    where
        F: Fn(&T, Vec<Value>) -> BridgeResult<Value> + 'static,
    {
        let type_name = self.desc.name.clone();
        let method = MethodDesc {
            name: name.to_string(),
            params,
            is_static: false,
            invoke: Box::new(move |owner, args| f(view::<T>(&**owner, &type_name)?, args)),
        };
        self.desc.methods.entry(name.to_string()).or_default().push(Rc::new(method));
        self
    }

    /// Static method declared on this type. Like extensions, it receives
    /// the owner as its first argument when called through a path.
    pub fn static_method<F>(mut self, name: &str, params: Vec<ValueType>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> BridgeResult<Value> + 'static,
    {
        let method = MethodDesc {
            name: name.to_string(),
            params,
            is_static: true,
            invoke: Box::new(move |_, args| f(args)),
        };
        self.desc.methods.entry(name.to_string()).or_default().push(Rc::new(method));
        self
    }

    pub fn finish(self) {
        let TypeBuilder { registry, desc, .. } = self;
        registry.types.insert(desc.name.clone(), desc);
    }

    fn member<G, S>(mut self, name: &str, kind: MemberKind, ty: ValueType, get: G, set: Option<S>) -> Self
    where
        G: Fn(&T) -> Value + 'static,
        S: Fn(&T, Value) -> BridgeResult<()> + 'static,
    {
        let type_name = self.desc.name.clone();
        let get_type = type_name.clone();
        let getter: Getter = Box::new(move |owner| Ok(get(view::<T>(owner, &get_type)?)));
        let setter = set.map(|set| -> Setter {
            let set_type = type_name.clone();
            Box::new(move |owner, value| set(view::<T>(owner, &set_type)?, value))
        });
        let desc = Rc::new(MemberDesc {
            name: name.to_string(),
            kind,
            ty,
            declared_on: type_name,
            get: getter,
            set: setter,
        });
        match kind {
            MemberKind::Field => self.desc.fields.insert(name.to_string(), desc),
            MemberKind::Property => self.desc.properties.insert(name.to_string(), desc),
        };
        self
    }
}
