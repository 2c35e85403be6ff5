//! Explicit type descriptors for table, row and nested targets.
//!
//! A [`ClassDef`] is built once, at configuration time, for every Rust type
//! the mapper populates. It lists the type's operations (named methods with
//! declared parameter kinds), getters and nested targets as type-erased
//! closures over `dyn Any`, so the fill compiler can resolve
//! `setBeginTime`-style names ahead of time instead of looking them up per
//! record.
//!
//! Member names are matched case-insensitively and ignoring underscores, so
//! a record field `customer_id` resolves `setCustomerId`.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use heck::ToUpperCamelCase;

use crate::{
    data::{FromValue, Value, ValueKind},
    error::InvokeError,
};

/// A type-erased target object.
pub type Instance = Box<dyn Any + Send>;

/// One argument handed to an operation: a plain value or an owned object.
pub enum Arg {
    Value(Value),
    Object(Instance),
}

impl Arg {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Arg::Value(value) => Some(value),
            Arg::Object(_) => None,
        }
    }

    pub fn into_object<R: Any>(self) -> Option<R> {
        match self {
            Arg::Object(instance) => instance.downcast::<R>().ok().map(|boxed| *boxed),
            Arg::Value(_) => None,
        }
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => write!(f, "{value:?}"),
            Arg::Object(_) => f.write_str("<object>"),
        }
    }
}

pub(crate) fn member_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

type MethodFn = dyn Fn(&mut dyn Any, Vec<Arg>) -> Result<(), InvokeError> + Send + Sync;
type GetterFn = dyn Fn(&dyn Any) -> Option<Value> + Send + Sync;

pub struct MethodDef {
    name: String,
    params: Vec<ValueKind>,
    call: Arc<MethodFn>,
}

impl MethodDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ValueKind] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn invoke(&self, target: &mut dyn Any, args: Vec<Arg>) -> Result<(), InvokeError> {
        if args.len() != self.params.len() {
            return Err(InvokeError::Arity {
                method: self.name.clone(),
                expected: self.params.len(),
                found: args.len(),
            });
        }
        (self.call)(target, args)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

pub struct GetterDef {
    name: String,
    kind: ValueKind,
    nullable: bool,
    read: Arc<GetterFn>,
}

impl GetterDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    /// `false` for non-nullable primitives; such getters always yield a value.
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn read(&self, target: &dyn Any) -> Result<Value, InvokeError> {
        (self.read)(target).ok_or_else(|| InvokeError::TargetMismatch {
            method: self.name.clone(),
            expected: "the getter's declaring class",
        })
    }
}

impl fmt::Debug for GetterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetterDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullable", &self.nullable)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Rows append; the last element is the one being filled.
    List,
    /// Duplicates are dropped on merge; the first element is the one being filled.
    Set,
}

pub(crate) trait SingleSlot: Send + Sync {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any>;
    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
    fn install(&self, owner: &mut dyn Any, value: Instance) -> Result<(), InvokeError>;
}

pub(crate) trait CollectionSlot: Send + Sync {
    fn len(&self, owner: &mut dyn Any) -> Option<usize>;
    fn current_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
    fn push(&self, owner: &mut dyn Any, element: Instance) -> Result<(), InvokeError>;
    fn take_all(&self, owner: &mut dyn Any) -> Vec<Instance>;
    fn absorb(&self, owner: &mut dyn Any, elements: Vec<Instance>) -> Result<(), InvokeError>;
}

struct SingleField<T, N> {
    get: fn(&T) -> Option<&N>,
    get_mut: fn(&mut T) -> Option<&mut N>,
    install: fn(&mut T, N),
}

impl<T: Any, N: Any + Send> SingleSlot for SingleField<T, N> {
    fn get<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        let owner = owner.downcast_ref::<T>()?;
        (self.get)(owner).map(|nested| nested as &dyn Any)
    }

    fn get_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let owner = owner.downcast_mut::<T>()?;
        (self.get_mut)(owner).map(|nested| nested as &mut dyn Any)
    }

    fn install(&self, owner: &mut dyn Any, value: Instance) -> Result<(), InvokeError> {
        let owner = owner
            .downcast_mut::<T>()
            .ok_or_else(|| target_mismatch::<T>("install"))?;
        let value = value
            .downcast::<N>()
            .map_err(|_| target_mismatch::<N>("install"))?;
        (self.install)(owner, *value);
        Ok(())
    }
}

struct VecField<T, E> {
    access: fn(&mut T) -> &mut Vec<E>,
    kind: CollectionKind,
    same: Option<fn(&E, &E) -> bool>,
}

impl<T: Any, E: Any + Send> CollectionSlot for VecField<T, E> {
    fn len(&self, owner: &mut dyn Any) -> Option<usize> {
        let owner = owner.downcast_mut::<T>()?;
        Some((self.access)(owner).len())
    }

    fn current_mut<'a>(&self, owner: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let elements = (self.access)(owner.downcast_mut::<T>()?);
        let current = match self.kind {
            CollectionKind::List => elements.last_mut(),
            CollectionKind::Set => elements.first_mut(),
        };
        current.map(|element| element as &mut dyn Any)
    }

    fn push(&self, owner: &mut dyn Any, element: Instance) -> Result<(), InvokeError> {
        let owner = owner
            .downcast_mut::<T>()
            .ok_or_else(|| target_mismatch::<T>("push"))?;
        let element = element
            .downcast::<E>()
            .map_err(|_| target_mismatch::<E>("push"))?;
        (self.access)(owner).push(*element);
        Ok(())
    }

    fn take_all(&self, owner: &mut dyn Any) -> Vec<Instance> {
        match owner.downcast_mut::<T>() {
            Some(owner) => std::mem::take((self.access)(owner))
                .into_iter()
                .map(|element| Box::new(element) as Instance)
                .collect(),
            None => Vec::new(),
        }
    }

    fn absorb(&self, owner: &mut dyn Any, elements: Vec<Instance>) -> Result<(), InvokeError> {
        let owner = owner
            .downcast_mut::<T>()
            .ok_or_else(|| target_mismatch::<T>("absorb"))?;
        let target = (self.access)(owner);
        for element in elements {
            let element = *element
                .downcast::<E>()
                .map_err(|_| target_mismatch::<E>("absorb"))?;
            if let Some(same) = self.same
                && target.iter().any(|existing| same(existing, &element))
            {
                continue;
            }
            target.push(element);
        }
        Ok(())
    }
}

fn target_mismatch<T>(method: &str) -> InvokeError {
    InvokeError::TargetMismatch {
        method: method.to_string(),
        expected: type_name::<T>(),
    }
}

enum Slot {
    Single(Arc<dyn SingleSlot>),
    Collection(CollectionKind, Arc<dyn CollectionSlot>),
}

/// A property of a class whose value is itself a mapped object (or a
/// collection of them).
pub struct NestedDef {
    property: String,
    class: Arc<ClassDef>,
    slot: Slot,
}

impl NestedDef {
    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    pub fn collection_kind(&self) -> Option<CollectionKind> {
        match &self.slot {
            Slot::Single(_) => None,
            Slot::Collection(kind, _) => Some(*kind),
        }
    }

    pub fn is_collection(&self) -> bool {
        self.collection_kind().is_some()
    }

    /// Current nested instance of a single-valued property, if set.
    pub fn read<'a>(&self, owner: &'a dyn Any) -> Option<&'a dyn Any> {
        match &self.slot {
            Slot::Single(slot) => slot.get(owner),
            Slot::Collection(..) => None,
        }
    }

    /// Resolves the instance a nested fill applies to, creating it when
    /// missing. Collections only grow a first element when `has_values`.
    pub fn target_mut<'a>(
        &self,
        owner: &'a mut dyn Any,
        has_values: bool,
    ) -> Result<Option<&'a mut dyn Any>, InvokeError> {
        match &self.slot {
            Slot::Single(slot) => {
                if slot.get_mut(owner).is_none() {
                    slot.install(owner, self.class.instantiate())?;
                }
                Ok(slot.get_mut(owner))
            }
            Slot::Collection(_, slot) => {
                let len = slot
                    .len(owner)
                    .ok_or_else(|| target_mismatch::<()>(&self.property))?;
                if len == 0 {
                    if !has_values {
                        return Ok(None);
                    }
                    slot.push(owner, self.class.instantiate())?;
                }
                Ok(slot.current_mut(owner))
            }
        }
    }

    pub(crate) fn take_elements(&self, owner: &mut dyn Any) -> Vec<Instance> {
        match &self.slot {
            Slot::Collection(_, slot) => slot.take_all(owner),
            Slot::Single(_) => Vec::new(),
        }
    }

    pub(crate) fn absorb_elements(
        &self,
        owner: &mut dyn Any,
        elements: Vec<Instance>,
    ) -> Result<(), InvokeError> {
        match &self.slot {
            Slot::Collection(_, slot) => slot.absorb(owner, elements),
            Slot::Single(_) => Ok(()),
        }
    }
}

impl fmt::Debug for NestedDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedDef")
            .field("property", &self.property)
            .field("class", &self.class.name)
            .field("collection", &self.collection_kind())
            .finish()
    }
}

pub struct ClassDef {
    name: String,
    type_id: TypeId,
    factory: Arc<dyn Fn() -> Instance + Send + Sync>,
    methods: Vec<Arc<MethodDef>>,
    getters: Vec<Arc<GetterDef>>,
    nested: Vec<Arc<NestedDef>>,
}

impl ClassDef {
    pub fn builder<T: Default + Send + 'static>(name: impl Into<String>) -> ClassBuilder<T> {
        ClassBuilder {
            name: name.into(),
            methods: Vec::new(),
            getters: Vec::new(),
            nested: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Instance {
        (self.factory)()
    }

    pub fn is_instance(&self, target: &dyn Any) -> bool {
        target.type_id() == self.type_id
    }

    pub fn methods(&self) -> &[Arc<MethodDef>] {
        &self.methods
    }

    /// Methods named `name` (case-insensitive) taking exactly `arity` arguments.
    pub fn methods_named(&self, name: &str, arity: usize) -> Vec<Arc<MethodDef>> {
        let key = member_key(name);
        self.methods
            .iter()
            .filter(|method| method.arity() == arity && member_key(&method.name) == key)
            .cloned()
            .collect()
    }

    /// Getters for `property`, matched as `get<property>`.
    pub fn getters_for(&self, property: &str) -> Vec<Arc<GetterDef>> {
        let key = member_key(&format!("get{property}"));
        self.getters
            .iter()
            .filter(|getter| member_key(&getter.name) == key)
            .cloned()
            .collect()
    }

    pub fn nested(&self, property: &str) -> Option<Arc<NestedDef>> {
        self.nested_ref(property).cloned()
    }

    pub fn nested_ref(&self, property: &str) -> Option<&Arc<NestedDef>> {
        let key = member_key(property);
        self.nested
            .iter()
            .find(|nested| member_key(&nested.property) == key)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Arc<NestedDef>> {
        self.nested.iter().filter(|nested| nested.is_collection())
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("getters", &self.getters)
            .field("nested", &self.nested)
            .finish()
    }
}

/// Typed builder producing an erased [`ClassDef`] for `T`.
pub struct ClassBuilder<T> {
    name: String,
    methods: Vec<Arc<MethodDef>>,
    getters: Vec<Arc<GetterDef>>,
    nested: Vec<Arc<NestedDef>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Default + Send + 'static> ClassBuilder<T> {
    /// Registers an operation taking the raw argument list.
    pub fn method<F>(mut self, name: &str, params: Vec<ValueKind>, call: F) -> Self
    where
        F: Fn(&mut T, Vec<Arg>) -> Result<(), InvokeError> + Send + Sync + 'static,
    {
        let method_name = name.to_string();
        let erased = move |target: &mut dyn Any, args: Vec<Arg>| -> Result<(), InvokeError> {
            let target = target
                .downcast_mut::<T>()
                .ok_or_else(|| target_mismatch::<T>(&method_name))?;
            call(target, args)
        };
        self.methods.push(Arc::new(MethodDef {
            name: name.to_string(),
            params,
            call: Arc::new(erased),
        }));
        self
    }

    /// Registers `set<Property>` taking one value of `kind`.
    pub fn setter<V, F>(self, property: &str, kind: ValueKind, set: F) -> Self
    where
        V: FromValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let name = format!("set{}", property.to_upper_camel_case());
        let method_name = name.clone();
        self.method(&name, vec![kind], move |target, args| {
            let value = args
                .into_iter()
                .next()
                .and_then(Arg::into_value)
                .ok_or_else(|| InvokeError::ExpectedObject {
                    method: method_name.clone(),
                    index: 0,
                })?;
            set(target, V::from_value(value)?);
            Ok(())
        })
    }

    /// Registers an operation taking a single object of class `row`.
    pub fn adder<R, F>(self, name: &str, row: &ClassDef, add: F) -> Self
    where
        R: Any,
        F: Fn(&mut T, R) + Send + Sync + 'static,
    {
        let method_name = name.to_string();
        self.method(
            name,
            vec![ValueKind::Object(row.name().to_string())],
            move |target, args| {
                let row = args
                    .into_iter()
                    .next()
                    .and_then(Arg::into_object::<R>)
                    .ok_or_else(|| InvokeError::ExpectedObject {
                        method: method_name.clone(),
                        index: 0,
                    })?;
                add(target, row);
                Ok(())
            },
        )
    }

    /// Registers a nullable `get<Property>`.
    pub fn getter<V, F>(self, property: &str, kind: ValueKind, read: F) -> Self
    where
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.push_getter(property, kind, true, read)
    }

    /// Registers a `get<Property>` backed by a non-nullable primitive.
    pub fn primitive_getter<V, F>(self, property: &str, kind: ValueKind, read: F) -> Self
    where
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.push_getter(property, kind, false, read)
    }

    fn push_getter<V, F>(mut self, property: &str, kind: ValueKind, nullable: bool, read: F) -> Self
    where
        V: Into<Value>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        let erased = move |target: &dyn Any| -> Option<Value> {
            target.downcast_ref::<T>().map(|t| read(t).into())
        };
        self.getters.push(Arc::new(GetterDef {
            name: format!("get{}", property.to_upper_camel_case()),
            kind,
            nullable,
            read: Arc::new(erased),
        }));
        self
    }

    /// Registers a single nested object reachable through `property`.
    pub fn nested<N: Any + Send>(
        mut self,
        property: &str,
        class: &Arc<ClassDef>,
        get: fn(&T) -> Option<&N>,
        get_mut: fn(&mut T) -> Option<&mut N>,
        install: fn(&mut T, N),
    ) -> Self {
        self.nested.push(Arc::new(NestedDef {
            property: property.to_string(),
            class: Arc::clone(class),
            slot: Slot::Single(Arc::new(SingleField {
                get,
                get_mut,
                install,
            })),
        }));
        self
    }

    /// Registers a list-like one-to-many property.
    pub fn list_of<E: Any + Send>(
        self,
        property: &str,
        class: &Arc<ClassDef>,
        access: fn(&mut T) -> &mut Vec<E>,
    ) -> Self {
        self.push_collection(property, class, CollectionKind::List, access, None)
    }

    /// Registers a set-like one-to-many property; merged elements equal to an
    /// existing one are dropped.
    pub fn set_of<E: Any + Send + PartialEq>(
        self,
        property: &str,
        class: &Arc<ClassDef>,
        access: fn(&mut T) -> &mut Vec<E>,
    ) -> Self {
        self.push_collection(
            property,
            class,
            CollectionKind::Set,
            access,
            Some(<E as PartialEq>::eq),
        )
    }

    fn push_collection<E: Any + Send>(
        mut self,
        property: &str,
        class: &Arc<ClassDef>,
        kind: CollectionKind,
        access: fn(&mut T) -> &mut Vec<E>,
        same: Option<fn(&E, &E) -> bool>,
    ) -> Self {
        self.nested.push(Arc::new(NestedDef {
            property: property.to_string(),
            class: Arc::clone(class),
            slot: Slot::Collection(kind, Arc::new(VecField { access, kind, same })),
        }));
        self
    }

    pub fn build(self) -> Arc<ClassDef> {
        Arc::new(ClassDef {
            name: self.name,
            type_id: TypeId::of::<T>(),
            factory: Arc::new(|| Box::new(T::default()) as Instance),
            methods: self.methods,
            getters: self.getters,
            nested: self.nested,
        })
    }
}
