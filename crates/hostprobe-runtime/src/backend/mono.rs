//! Mono backend
//!
//! The host drives assembly enumeration through a callback, classes are read
//! row by row from each image's TypeDef table, and members are drained through
//! cursor enumerators. Methods are JIT-compiled on request, and further
//! assemblies can be opened from disk while the host runs.

use super::{call, drain_cursor, name_of, MetadataBackend};
use crate::catalog::model::{
    Arg, RawAssembly, RawClass, RawField, RawMethod, Type, ATTRIBUTE_STATIC,
};
use crate::error::{AssemblyLoadError, WalkError, WalkResult};
use crate::ffi::{AssemblyVisitor, Handle, Resolver};
use crate::loading::{EntryPoint, LoadedAssembly};
use hostprobe_config::Mode;
use std::ffi::{c_char, c_void, CStr};

/// MONO_TABLE_TYPEDEF
const TYPEDEF_TABLE: i32 = 2;

/// Metadata token prefix for TypeDef rows
const TYPEDEF_TOKEN: u32 = 0x0200_0000;

/// Every export this backend may call
pub const EXPORTS: &[&str] = &[
    "mono_get_root_domain",
    "mono_thread_attach",
    "mono_jit_thread_attach",
    "mono_thread_current",
    "mono_thread_detach",
    "mono_assembly_foreach",
    "mono_assembly_get_image",
    "mono_image_get_name",
    "mono_image_get_filename",
    "mono_image_get_table_info",
    "mono_table_info_get_rows",
    "mono_class_get",
    "mono_class_get_name",
    "mono_class_get_namespace",
    "mono_class_get_parent",
    "mono_class_get_fields",
    "mono_class_get_methods",
    "mono_class_get_interfaces",
    "mono_class_get_type",
    "mono_class_vtable",
    "mono_field_get_name",
    "mono_field_get_type",
    "mono_field_get_offset",
    "mono_field_get_flags",
    "mono_field_static_get_value",
    "mono_field_static_set_value",
    "mono_method_signature",
    "mono_method_get_name",
    "mono_method_get_flags",
    "mono_method_get_param_names",
    "mono_signature_get_return_type",
    "mono_signature_get_param_count",
    "mono_signature_get_params",
    "mono_type_get_name",
    "mono_type_size",
    "mono_type_get_object",
    "mono_object_new",
    "mono_object_unbox",
    "mono_string_new",
    "mono_compile_method",
    "mono_runtime_invoke",
    "mono_domain_assembly_open",
    "mono_class_from_name",
    "mono_method_desc_new",
    "mono_method_desc_search_in_class",
    "mono_method_desc_free",
];

extern "C" fn collect_assembly(assembly: Handle, user_data: *mut c_void) {
    // SAFETY: user_data is the Vec passed to mono_assembly_foreach below
    let found = unsafe { &mut *(user_data as *mut Vec<Handle>) };
    found.push(assembly);
}

#[derive(Debug)]
pub struct MonoBackend {
    resolver: Resolver,
    domain: Handle,
}

impl MonoBackend {
    pub fn new(resolver: Resolver) -> Self {
        let domain: Handle = unsafe { resolver.invoke("mono_get_root_domain", ()) };
        if domain.is_null() {
            tracing::warn!("mono root domain unavailable");
        }
        Self { resolver, domain }
    }

    fn type_of(&self, ty: Handle) -> WalkResult<Type> {
        let r = &self.resolver;
        unsafe {
            let name = name_of(r, "mono_type_get_name", ty, "type name")?;
            let mut align: i32 = 0;
            let size: i32 = call(r, "mono_type_size", (ty, &mut align as *mut i32))?;
            Ok(Type::new(ty, name, size))
        }
    }

    fn args_of(&self, method: Handle, signature: Handle) -> WalkResult<Vec<Arg>> {
        let r = &self.resolver;
        let count: u32 = unsafe { call(r, "mono_signature_get_param_count", (signature,))? };

        let mut names: Vec<*const c_char> = vec![std::ptr::null(); count as usize];
        if count > 0 {
            unsafe {
                call::<_, ()>(
                    r,
                    "mono_method_get_param_names",
                    (method, names.as_mut_ptr()),
                )?
            };
        }

        let params = unsafe { drain_cursor(r, "mono_signature_get_params", signature) };
        let mut args = Vec::with_capacity(params.len());
        for (index, ty) in params.into_iter().enumerate() {
            let name = names
                .get(index)
                .and_then(|n| unsafe { Handle::from_ptr(*n).read_c_str() })
                .unwrap_or_default();
            match self.type_of(ty) {
                Ok(ty) => args.push(Arg { name, ty }),
                Err(e) => tracing::warn!(%method, index, error = %e, "skipping parameter"),
            }
        }

        Ok(args)
    }
}

impl MetadataBackend for MonoBackend {
    fn mode(&self) -> Mode {
        Mode::Mono
    }

    fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    fn domain(&self) -> Handle {
        self.domain
    }

    fn attach_thread(&self) {
        unsafe {
            let _: Handle = self.resolver.invoke("mono_thread_attach", (self.domain,));
            let _: Handle = self.resolver.invoke("mono_jit_thread_attach", (self.domain,));
        }
    }

    fn detach_thread(&self) {
        let thread: Handle = unsafe { self.resolver.invoke("mono_thread_current", ()) };
        if !thread.is_null() {
            unsafe { self.resolver.invoke::<_, ()>("mono_thread_detach", (thread,)) };
        }
    }

    fn assemblies(&self) -> Vec<Handle> {
        let mut found: Vec<Handle> = Vec::new();
        let visitor: AssemblyVisitor = collect_assembly;
        unsafe {
            self.resolver.invoke::<_, ()>(
                "mono_assembly_foreach",
                (visitor, &mut found as *mut Vec<Handle> as *mut c_void),
            )
        };
        found.retain(|a| !a.is_null());
        found
    }

    fn assembly_info(&self, assembly: Handle) -> WalkResult<RawAssembly> {
        let r = &self.resolver;
        unsafe {
            let image: Handle = call(r, "mono_assembly_get_image", (assembly,))?;
            Ok(RawAssembly {
                image,
                name: name_of(r, "mono_image_get_name", image, "image name")?,
                file: name_of(r, "mono_image_get_filename", image, "image file")?,
            })
        }
    }

    fn classes(&self, image: Handle) -> Vec<Handle> {
        let r = &self.resolver;
        let table: Handle =
            unsafe { r.invoke("mono_image_get_table_info", (image, TYPEDEF_TABLE)) };
        if table.is_null() {
            return Vec::new();
        }
        let rows: i32 = unsafe { r.invoke("mono_table_info_get_rows", (table,)) };

        (0..rows.max(0) as u32)
            .filter_map(|row| {
                let class: Handle =
                    unsafe { r.invoke("mono_class_get", (image, TYPEDEF_TOKEN | (row + 1))) };
                class.non_null()
            })
            .collect()
    }

    fn class_info(&self, class: Handle) -> WalkResult<RawClass> {
        let r = &self.resolver;
        unsafe {
            let name = name_of(r, "mono_class_get_name", class, "class name")?;
            let parent: Handle = call(r, "mono_class_get_parent", (class,))?;
            let parent = match parent.non_null() {
                Some(parent) => name_of(r, "mono_class_get_name", parent, "parent name")?,
                None => String::new(),
            };
            let namespace: Handle = call(r, "mono_class_get_namespace", (class,))?;

            Ok(RawClass {
                name,
                namespace: namespace.read_c_str().unwrap_or_default(),
                parent,
            })
        }
    }

    fn fields(&self, class: Handle) -> Vec<Handle> {
        unsafe { drain_cursor(&self.resolver, "mono_class_get_fields", class) }
    }

    fn methods(&self, class: Handle) -> Vec<Handle> {
        unsafe { drain_cursor(&self.resolver, "mono_class_get_methods", class) }
    }

    fn interfaces(&self, class: Handle) -> Vec<Handle> {
        unsafe { drain_cursor(&self.resolver, "mono_class_get_interfaces", class) }
    }

    fn field_info(&self, field: Handle) -> WalkResult<RawField> {
        let r = &self.resolver;
        unsafe {
            let name = name_of(r, "mono_field_get_name", field, "field name")?;
            let ty: Handle = call(r, "mono_field_get_type", (field,))?;
            let offset: i32 = call(r, "mono_field_get_offset", (field,))?;
            let flags: u32 = call(r, "mono_field_get_flags", (field,))?;

            Ok(RawField {
                handle: field,
                name,
                ty: self.type_of(ty)?,
                offset,
                is_static: flags & ATTRIBUTE_STATIC != 0,
            })
        }
    }

    fn method_info(&self, method: Handle) -> WalkResult<RawMethod> {
        let r = &self.resolver;
        unsafe {
            let signature: Handle = call(r, "mono_method_signature", (method,))?;
            if signature.is_null() {
                return Err(WalkError::MissingSignature(method));
            }

            let name = name_of(r, "mono_method_get_name", method, "method name")?;
            let return_type: Handle = call(r, "mono_signature_get_return_type", (signature,))?;
            let mut impl_flags: u32 = 0;
            let flags: u32 = call(
                r,
                "mono_method_get_flags",
                (method, &mut impl_flags as *mut u32),
            )?;

            Ok(RawMethod {
                handle: method,
                name,
                return_type: self.type_of(return_type)?,
                flags,
                args: self.args_of(method, signature)?,
                function: None,
            })
        }
    }

    fn compile_method(&self, method: Handle) -> Option<Handle> {
        let function: Handle = unsafe { self.resolver.invoke("mono_compile_method", (method,)) };
        function.non_null()
    }

    unsafe fn runtime_invoke(
        &self,
        method: Handle,
        instance: Handle,
        args: *mut *mut c_void,
    ) -> Handle {
        self.resolver.invoke(
            "mono_runtime_invoke",
            (method, instance, args, std::ptr::null_mut::<Handle>()),
        )
    }

    fn unbox(&self, object: Handle) -> Handle {
        unsafe { self.resolver.invoke("mono_object_unbox", (object,)) }
    }

    fn object_new(&self, class: Handle) -> Handle {
        unsafe { self.resolver.invoke("mono_object_new", (self.domain, class)) }
    }

    fn string_new(&self, text: &CStr) -> Handle {
        unsafe { self.resolver.invoke("mono_string_new", (self.domain, text.as_ptr())) }
    }

    fn class_type(&self, class: Handle) -> Handle {
        unsafe { self.resolver.invoke("mono_class_get_type", (class,)) }
    }

    fn type_object(&self, ty: Handle) -> Handle {
        unsafe { self.resolver.invoke("mono_type_get_object", (self.domain, ty)) }
    }

    fn static_field_table(&self, class: Handle) -> Option<Handle> {
        let vtable: Handle =
            unsafe { self.resolver.invoke("mono_class_vtable", (self.domain, class)) };
        vtable.non_null()
    }

    unsafe fn static_field_get(&self, field: Handle, table: Option<Handle>, out: *mut c_void) {
        let Some(vtable) = table else {
            tracing::debug!(%field, "static read without vtable");
            return;
        };
        self.resolver
            .invoke::<_, ()>("mono_field_static_get_value", (vtable, field, out))
    }

    unsafe fn static_field_set(&self, field: Handle, table: Option<Handle>, value: *mut c_void) {
        let Some(vtable) = table else {
            tracing::debug!(%field, "static write without vtable");
            return;
        };
        self.resolver
            .invoke::<_, ()>("mono_field_static_set_value", (vtable, field, value))
    }

    fn load_assembly(
        &self,
        path: &CStr,
        entry: Option<&EntryPoint>,
    ) -> Result<LoadedAssembly, AssemblyLoadError> {
        let r = &self.resolver;
        let assembly: Handle =
            unsafe { r.try_invoke("mono_domain_assembly_open", (self.domain, path.as_ptr()))? };
        if assembly.is_null() {
            return Err(AssemblyLoadError::Open(path.to_string_lossy().into_owned()));
        }
        let image: Handle = unsafe { r.try_invoke("mono_assembly_get_image", (assembly,))? };

        let mut loaded = LoadedAssembly {
            assembly,
            image,
            class: None,
            method: None,
        };
        let Some(entry) = entry else {
            return Ok(loaded);
        };

        let class: Handle = unsafe {
            r.try_invoke(
                "mono_class_from_name",
                (image, entry.namespace.as_ptr(), entry.class.as_ptr()),
            )?
        };
        let class = class.non_null().ok_or_else(|| AssemblyLoadError::ClassNotFound {
            namespace: entry.namespace.to_string_lossy().into_owned(),
            class: entry.class.to_string_lossy().into_owned(),
        })?;

        let method_not_found =
            || AssemblyLoadError::MethodNotFound(entry.method.to_string_lossy().into_owned());
        let desc: Handle =
            unsafe { r.try_invoke("mono_method_desc_new", (entry.method.as_ptr(), 1i32))? };
        let desc = desc.non_null().ok_or_else(method_not_found)?;
        let method: Result<Handle, _> =
            unsafe { r.try_invoke("mono_method_desc_search_in_class", (desc, class)) };
        unsafe { r.invoke::<_, ()>("mono_method_desc_free", (desc,)) };
        let method = method?.non_null().ok_or_else(method_not_found)?;

        let _: Handle = unsafe {
            r.try_invoke(
                "mono_runtime_invoke",
                (
                    method,
                    Handle::NULL,
                    std::ptr::null_mut::<*mut c_void>(),
                    std::ptr::null_mut::<Handle>(),
                ),
            )?
        };

        loaded.class = Some(class);
        loaded.method = Some(method);
        Ok(loaded)
    }
}
