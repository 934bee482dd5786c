//! Object construction, type objects and field access

use crate::catalog::{Catalog, Class, Field, Type};
use crate::ffi::{Handle, HostReturn};
use std::ffi::{c_void, CString};

impl Catalog {
    /// Allocate an instance of `class` without running a constructor
    pub fn new_object(&self, class: &Class) -> Handle {
        self.backend.object_new(class.handle)
    }

    /// Create a managed string. Interior NULs truncate the text.
    pub fn new_string(&self, text: &str) -> Handle {
        let text = match CString::new(text) {
            Ok(text) => text,
            Err(e) => {
                let end = e.nul_position();
                CString::new(&text[..end]).unwrap_or_default()
            }
        };
        self.backend.string_new(&text)
    }

    /// Managed `System.Type` object for a type, memoized on the type
    pub fn type_object(&self, ty: &Type) -> Handle {
        memoize(&ty.object, || self.backend.type_object(ty.handle))
    }

    /// Managed `System.Type` object for a class, memoized on the class
    pub fn class_type_object(&self, class: &Class) -> Handle {
        memoize(&class.type_object, || {
            let ty = self.backend.class_type(class.handle);
            if ty.is_null() {
                return Handle::NULL;
            }
            self.backend.type_object(ty)
        })
    }

    /// Read a static field. Instance fields yield `T::fallback()`.
    ///
    /// # Safety
    ///
    /// `T` must match the field's type.
    pub unsafe fn get_static_value<T>(&self, field: &Field) -> T
    where
        T: HostReturn + Copy,
    {
        let mut value = T::fallback();
        if !field.is_static {
            return value;
        }

        let table = self.static_table(field);
        self.backend
            .static_field_get(field.handle, table, &mut value as *mut T as *mut c_void);
        value
    }

    /// Write a static field. Instance fields are left untouched.
    ///
    /// # Safety
    ///
    /// `T` must match the field's type.
    pub unsafe fn set_static_value<T: Copy>(&self, field: &Field, mut value: T) {
        if !field.is_static {
            return;
        }

        let table = self.static_table(field);
        self.backend
            .static_field_set(field.handle, table, &mut value as *mut T as *mut c_void);
    }

    fn static_table(&self, field: &Field) -> Option<Handle> {
        if let Some(table) = field.table.get() {
            return Some(*table);
        }
        let class = field.class()?;
        let table = self.backend.static_field_table(class.handle)?;
        Some(*field.table.get_or_init(|| table))
    }
}

/// Return the cached handle or fetch it, remembering only a non-null result
fn memoize(cell: &once_cell::sync::OnceCell<Handle>, fetch: impl FnOnce() -> Handle) -> Handle {
    if let Some(cached) = cell.get() {
        return *cached;
    }
    match fetch().non_null() {
        Some(handle) => *cell.get_or_init(|| handle),
        None => Handle::NULL,
    }
}

impl Field {
    /// Read this field from an object instance.
    ///
    /// Static fields and null instances yield `T::fallback()`.
    ///
    /// # Safety
    ///
    /// `instance` must be null or a live object of the owning class, and `T`
    /// must match the field's type.
    pub unsafe fn read<T: HostReturn + Copy>(&self, instance: Handle) -> T {
        if self.is_static || instance.is_null() {
            return T::fallback();
        }
        std::ptr::read_unaligned(instance.offset(self.offset as isize).as_ptr() as *const T)
    }

    /// Write this field on an object instance.
    ///
    /// Static fields and null instances are ignored.
    ///
    /// # Safety
    ///
    /// See [`Field::read`].
    pub unsafe fn write<T: Copy>(&self, instance: Handle, value: T) {
        if self.is_static || instance.is_null() {
            return;
        }
        std::ptr::write_unaligned(instance.offset(self.offset as isize).as_ptr() as *mut T, value)
    }
}

impl Class {
    /// Read a named field from an instance; unknown names yield `T::fallback()`.
    ///
    /// # Safety
    ///
    /// See [`Field::read`].
    pub unsafe fn read_field<T: HostReturn + Copy>(&self, instance: Handle, name: &str) -> T {
        match self.get_field(name) {
            Some(field) => field.read(instance),
            None => T::fallback(),
        }
    }

    /// Write a named field on an instance; unknown names are ignored.
    ///
    /// # Safety
    ///
    /// See [`Field::read`].
    pub unsafe fn write_field<T: Copy>(&self, instance: Handle, name: &str, value: T) {
        if let Some(field) = self.get_field(name) {
            field.write(instance, value);
        }
    }
}
