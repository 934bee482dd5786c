//! Catalog entities
//!
//! One schema for both host flavors. Entities are immutable after the walk
//! except for their cache cells, each of which is written at most once.

use crate::ffi::Handle;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};

/// METHOD_ATTRIBUTE_STATIC / FIELD_ATTRIBUTE_STATIC
pub const ATTRIBUTE_STATIC: u32 = 0x10;

/// A host type reference
///
/// The fully-qualified `name` is the identity key for signature matching.
#[derive(Debug)]
pub struct Type {
    pub handle: Handle,
    pub name: String,
    /// Size in bytes, `-1` when the host does not report it
    pub size: i32,
    pub(crate) object: OnceCell<Handle>,
}

impl Type {
    pub fn new(handle: Handle, name: impl Into<String>, size: i32) -> Self {
        Self {
            handle,
            name: name.into(),
            size,
            object: OnceCell::new(),
        }
    }

    /// Size in bytes when known
    pub fn known_size(&self) -> Option<usize> {
        usize::try_from(self.size).ok()
    }
}

/// A named method parameter
#[derive(Debug)]
pub struct Arg {
    pub name: String,
    pub ty: Type,
}

/// A field as produced by a backend, before it is attached to its class
#[derive(Debug)]
pub struct RawField {
    pub handle: Handle,
    pub name: String,
    pub ty: Type,
    pub offset: i32,
    pub is_static: bool,
}

/// A method as produced by a backend, before it is attached to its class
#[derive(Debug)]
pub struct RawMethod {
    pub handle: Handle,
    pub name: String,
    pub return_type: Type,
    pub flags: u32,
    pub args: Vec<Arg>,
    /// Native entry point when the host compiled it ahead of time
    pub function: Option<Handle>,
}

/// Class identity as produced by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClass {
    pub name: String,
    pub namespace: String,
    /// Parent class name, empty for roots
    pub parent: String,
}

/// Assembly identity as produced by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAssembly {
    pub image: Handle,
    pub name: String,
    pub file: String,
}

pub struct Field {
    pub handle: Handle,
    pub name: String,
    pub ty: Type,
    /// Byte offset from the instance base; meaningful only when `!is_static`
    pub offset: i32,
    pub is_static: bool,
    pub(crate) class: Weak<Class>,
    /// Backend table handle needed for static access (Mono vtable)
    pub(crate) table: OnceCell<Handle>,
}

impl Field {
    pub(crate) fn attach(raw: RawField, class: Weak<Class>) -> Self {
        Self {
            handle: raw.handle,
            name: raw.name,
            ty: raw.ty,
            offset: raw.offset,
            is_static: raw.is_static,
            class,
            table: OnceCell::new(),
        }
    }

    /// Owning class, while the catalog is alive
    pub fn class(&self) -> Option<Arc<Class>> {
        self.class.upgrade()
    }

    /// Cached backend table handle, if one was fetched
    pub fn table(&self) -> Option<Handle> {
        self.table.get().copied()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("type", &self.ty.name)
            .field("offset", &self.offset)
            .field("is_static", &self.is_static)
            .finish()
    }
}

pub struct Method {
    pub handle: Handle,
    pub name: String,
    pub return_type: Type,
    /// Raw attribute bitfield from the host
    pub flags: u32,
    pub is_static: bool,
    pub args: Vec<Arg>,
    pub(crate) class: Weak<Class>,
    pub(crate) function: OnceCell<Handle>,
}

impl Method {
    pub(crate) fn attach(raw: RawMethod, class: Weak<Class>) -> Self {
        let function = match raw.function.and_then(Handle::non_null) {
            Some(address) => OnceCell::with_value(address),
            None => OnceCell::new(),
        };

        Self {
            handle: raw.handle,
            name: raw.name,
            is_static: raw.flags & ATTRIBUTE_STATIC != 0,
            return_type: raw.return_type,
            flags: raw.flags,
            args: raw.args,
            class,
            function,
        }
    }

    /// Owning class, while the catalog is alive
    pub fn class(&self) -> Option<Arc<Class>> {
        self.class.upgrade()
    }

    /// Native entry point if already known; see `Catalog::function_pointer`
    pub fn function(&self) -> Option<Handle> {
        self.function.get().copied()
    }

    /// Entry point relative to a module base address
    pub fn function_rva(&self, module_base: Handle) -> Option<usize> {
        self.function()
            .map(|f| f.addr().wrapping_sub(module_base.addr()))
    }

    /// Parameter type names, in declaration order
    pub fn arg_type_names(&self) -> Vec<&str> {
        self.args.iter().map(|a| a.ty.name.as_str()).collect()
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("return_type", &self.return_type.name)
            .field("args", &self.arg_type_names())
            .field("flags", &format_args!("{:#x}", self.flags))
            .field("is_static", &self.is_static)
            .field("function", &self.function())
            .finish()
    }
}

#[derive(Debug)]
pub struct Class {
    pub handle: Handle,
    pub name: String,
    pub namespace: String,
    pub parent: String,
    /// Own fields first, then interface fields in interface order
    pub fields: Vec<Field>,
    /// Own methods first, then interface methods in interface order
    pub methods: Vec<Method>,
    pub(crate) type_object: OnceCell<Handle>,
}

impl Class {
    /// Build a class whose members point back at it
    pub(crate) fn assemble(
        handle: Handle,
        info: RawClass,
        fields: Vec<RawField>,
        methods: Vec<RawMethod>,
    ) -> Arc<Class> {
        Arc::new_cyclic(|this| Class {
            handle,
            name: info.name,
            namespace: info.namespace,
            parent: info.parent,
            fields: fields
                .into_iter()
                .map(|f| Field::attach(f, this.clone()))
                .collect(),
            methods: methods
                .into_iter()
                .map(|m| Method::attach(m, this.clone()))
                .collect(),
            type_object: OnceCell::new(),
        })
    }

    /// `Namespace.Name`, or just `Name` at the root namespace
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug)]
pub struct Assembly {
    pub handle: Handle,
    pub image: Handle,
    pub name: String,
    /// Originating file path as reported by the host
    pub file: String,
    pub classes: Vec<Arc<Class>>,
}
