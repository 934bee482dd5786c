//! Il2Cpp backend
//!
//! Assemblies come back as a counted array, classes are addressed by index
//! within their image, and members are drained through cursor enumerators.
//! All methods are compiled ahead of time: the first word of a method handle
//! is its native entry point.

use super::{call, drain_cursor, name_of, MetadataBackend};
use crate::catalog::model::{Arg, RawAssembly, RawClass, RawField, RawMethod, Type};
use crate::error::WalkResult;
use crate::ffi::{Handle, Resolver};
use hostprobe_config::Mode;
use std::ffi::{c_void, CStr};

/// Il2Cpp does not report type sizes
const UNKNOWN_SIZE: i32 = -1;

/// Every export this backend may call
pub const EXPORTS: &[&str] = &[
    "il2cpp_domain_get",
    "il2cpp_domain_get_assemblies",
    "il2cpp_thread_attach",
    "il2cpp_thread_current",
    "il2cpp_thread_detach",
    "il2cpp_assembly_get_image",
    "il2cpp_image_get_name",
    "il2cpp_image_get_filename",
    "il2cpp_image_get_class_count",
    "il2cpp_image_get_class",
    "il2cpp_class_get_name",
    "il2cpp_class_get_namespace",
    "il2cpp_class_get_parent",
    "il2cpp_class_get_fields",
    "il2cpp_class_get_methods",
    "il2cpp_class_get_interfaces",
    "il2cpp_class_get_type",
    "il2cpp_field_get_name",
    "il2cpp_field_get_type",
    "il2cpp_field_get_offset",
    "il2cpp_field_static_get_value",
    "il2cpp_field_static_set_value",
    "il2cpp_method_get_name",
    "il2cpp_method_get_return_type",
    "il2cpp_method_get_flags",
    "il2cpp_method_get_param_count",
    "il2cpp_method_get_param_name",
    "il2cpp_method_get_param",
    "il2cpp_type_get_name",
    "il2cpp_type_get_object",
    "il2cpp_object_new",
    "il2cpp_object_unbox",
    "il2cpp_string_new",
    "il2cpp_runtime_invoke",
];

#[derive(Debug)]
pub struct Il2CppBackend {
    resolver: Resolver,
    domain: Handle,
}

impl Il2CppBackend {
    pub fn new(resolver: Resolver) -> Self {
        let domain: Handle = unsafe { resolver.invoke("il2cpp_domain_get", ()) };
        if domain.is_null() {
            tracing::warn!("il2cpp domain unavailable");
        }
        Self { resolver, domain }
    }

    fn type_of(&self, ty: Handle) -> WalkResult<Type> {
        let name = unsafe { name_of(&self.resolver, "il2cpp_type_get_name", ty, "type name")? };
        Ok(Type::new(ty, name, UNKNOWN_SIZE))
    }

    fn args_of(&self, method: Handle) -> WalkResult<Vec<Arg>> {
        let count: u32 =
            unsafe { call(&self.resolver, "il2cpp_method_get_param_count", (method,))? };

        (0..count)
            .map(|index| {
                let name: Handle = unsafe {
                    call(&self.resolver, "il2cpp_method_get_param_name", (method, index))?
                };
                let ty: Handle =
                    unsafe { call(&self.resolver, "il2cpp_method_get_param", (method, index))? };
                Ok(Arg {
                    // Stripped builds drop parameter names
                    name: unsafe { name.read_c_str() }.unwrap_or_default(),
                    ty: self.type_of(ty)?,
                })
            })
            .collect()
    }
}

impl MetadataBackend for Il2CppBackend {
    fn mode(&self) -> Mode {
        Mode::Il2Cpp
    }

    fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn domain(&self) -> Handle {
        self.domain
    }

    fn attach_thread(&self) {
        let _: Handle = unsafe { self.resolver.invoke("il2cpp_thread_attach", (self.domain,)) };
    }

    fn detach_thread(&self) {
        let thread: Handle = unsafe { self.resolver.invoke("il2cpp_thread_current", ()) };
        if !thread.is_null() {
            unsafe { self.resolver.invoke::<_, ()>("il2cpp_thread_detach", (thread,)) };
        }
    }

    fn assemblies(&self) -> Vec<Handle> {
        let mut count: usize = 0;
        let list: *const Handle = unsafe {
            self.resolver.invoke(
                "il2cpp_domain_get_assemblies",
                (self.domain, &mut count as *mut usize),
            )
        };
        if list.is_null() {
            return Vec::new();
        }

        // SAFETY: the host returns `count` contiguous assembly handles
        unsafe { std::slice::from_raw_parts(list, count) }
            .iter()
            .copied()
            .filter(|a| !a.is_null())
            .collect()
    }

    fn assembly_info(&self, assembly: Handle) -> WalkResult<RawAssembly> {
        let r = &self.resolver;
        unsafe {
            let image: Handle = call(r, "il2cpp_assembly_get_image", (assembly,))?;
            Ok(RawAssembly {
                image,
                name: name_of(r, "il2cpp_image_get_name", image, "image name")?,
                file: name_of(r, "il2cpp_image_get_filename", image, "image file")?,
            })
        }
    }

    fn classes(&self, image: Handle) -> Vec<Handle> {
        let count: usize =
            unsafe { self.resolver.invoke("il2cpp_image_get_class_count", (image,)) };

        (0..count)
            .filter_map(|index| {
                let class: Handle =
                    unsafe { self.resolver.invoke("il2cpp_image_get_class", (image, index)) };
                class.non_null()
            })
            .collect()
    }

    fn class_info(&self, class: Handle) -> WalkResult<RawClass> {
        let r = &self.resolver;
        unsafe {
            let name = name_of(r, "il2cpp_class_get_name", class, "class name")?;
            let parent: Handle = call(r, "il2cpp_class_get_parent", (class,))?;
            let parent = match parent.non_null() {
                Some(parent) => name_of(r, "il2cpp_class_get_name", parent, "parent name")?,
                None => String::new(),
            };
            let namespace: Handle = call(r, "il2cpp_class_get_namespace", (class,))?;

            Ok(RawClass {
                name,
                namespace: namespace.read_c_str().unwrap_or_default(),
                parent,
            })
        }
    }

    fn fields(&self, class: Handle) -> Vec<Handle> {
        unsafe { drain_cursor(&self.resolver, "il2cpp_class_get_fields", class) }
    }

    fn methods(&self, class: Handle) -> Vec<Handle> {
        unsafe { drain_cursor(&self.resolver, "il2cpp_class_get_methods", class) }
    }

    fn interfaces(&self, class: Handle) -> Vec<Handle> {
        unsafe { drain_cursor(&self.resolver, "il2cpp_class_get_interfaces", class) }
    }

    fn field_info(&self, field: Handle) -> WalkResult<RawField> {
        let r = &self.resolver;
        unsafe {
            let name = name_of(r, "il2cpp_field_get_name", field, "field name")?;
            let ty: Handle = call(r, "il2cpp_field_get_type", (field,))?;
            let offset: i32 = call(r, "il2cpp_field_get_offset", (field,))?;

            Ok(RawField {
                handle: field,
                name,
                ty: self.type_of(ty)?,
                offset,
                // Statics live outside the instance, so they carry no positive offset
                is_static: offset <= 0,
            })
        }
    }

    fn method_info(&self, method: Handle) -> WalkResult<RawMethod> {
        let r = &self.resolver;
        unsafe {
            let name = name_of(r, "il2cpp_method_get_name", method, "method name")?;
            let return_type: Handle = call(r, "il2cpp_method_get_return_type", (method,))?;
            let mut impl_flags: u32 = 0;
            let flags: u32 = call(
                r,
                "il2cpp_method_get_flags",
                (method, &mut impl_flags as *mut u32),
            )?;

            // SAFETY: MethodInfo begins with its method pointer
            let function = *(method.as_ptr() as *const Handle);

            Ok(RawMethod {
                handle: method,
                name,
                return_type: self.type_of(return_type)?,
                flags,
                args: self.args_of(method)?,
                function: function.non_null(),
            })
        }
    }

    fn compile_method(&self, _method: Handle) -> Option<Handle> {
        None
    }

    unsafe fn runtime_invoke(
        &self,
        method: Handle,
        instance: Handle,
        args: *mut *mut c_void,
    ) -> Handle {
        self.resolver.invoke(
            "il2cpp_runtime_invoke",
            (method, instance, args, std::ptr::null_mut::<Handle>()),
        )
    }

    fn unbox(&self, object: Handle) -> Handle {
        unsafe { self.resolver.invoke("il2cpp_object_unbox", (object,)) }
    }

    fn object_new(&self, class: Handle) -> Handle {
        unsafe { self.resolver.invoke("il2cpp_object_new", (class,)) }
    }

    fn string_new(&self, text: &CStr) -> Handle {
        unsafe { self.resolver.invoke("il2cpp_string_new", (text.as_ptr(),)) }
    }

    fn class_type(&self, class: Handle) -> Handle {
        unsafe { self.resolver.invoke("il2cpp_class_get_type", (class,)) }
    }

    fn type_object(&self, ty: Handle) -> Handle {
        unsafe { self.resolver.invoke("il2cpp_type_get_object", (ty,)) }
    }

    fn static_field_table(&self, _class: Handle) -> Option<Handle> {
        None
    }

    unsafe fn static_field_get(&self, field: Handle, _table: Option<Handle>, out: *mut c_void) {
        self.resolver
            .invoke::<_, ()>("il2cpp_field_static_get_value", (field, out))
    }

    unsafe fn static_field_set(&self, field: Handle, _table: Option<Handle>, value: *mut c_void) {
        self.resolver
            .invoke::<_, ()>("il2cpp_field_static_set_value", (field, value))
    }
}
