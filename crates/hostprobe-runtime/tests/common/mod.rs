//! In-process fixture host
//!
//! Implements both export families (`il2cpp_*` and `mono_*`) over one small
//! metadata model, exported through an instrumented `SymbolSource` that
//! counts lookups per name. Handles are plain pointers into the model.
//!
//! Layout of the standard fixture:
//!
//! ```text
//! Fixture.dll
//!   System.Object
//!   Fixture.IThing             Describe()
//!   Fixture.Foo : Object       Bar (i32 @ 8), Speed (f32 @ 12), static Count
//!                              Baz, Answer, Add, GetBar, F(i32), F(i32, f32), Explode
//!                              implements IThing
//!   <null slot>
//!   <poisoned class, name getter panics>
//!   Fixture.Qux
//! Second.dll
//!   Other.Foo
//! Plugin.dll                   opened by path only, never enumerated
//!   Loader.Entry               Main
//! ```

#![allow(dead_code)]

use hostprobe_runtime::ffi::AssemblyVisitor;
use hostprobe_runtime::{Handle, SymbolSource};
use parking_lot::Mutex;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

pub use pretty_assertions::{assert_eq, assert_ne};

pub const FIELD_STATIC: u32 = 0x10;
pub const METHOD_STATIC: u32 = 0x10;
const PUBLIC: u32 = 0x06;

/// Byte size of a fixture object instance
pub const OBJECT_SIZE: usize = 64;

type Invoker = fn(instance: Handle, params: *mut *mut c_void) -> Option<i64>;

// ===== Model =====

pub struct FixtureType {
    name: CString,
    size: i32,
    /// Address handed out as the type's managed object
    object: u8,
}

pub struct FixtureField {
    name: CString,
    ty: *const FixtureType,
    offset: i32,
    flags: u32,
    value: Cell<i32>,
}

pub struct FixtureParam {
    name: CString,
    ty: *const FixtureType,
}

#[repr(C)]
pub struct FixtureMethod {
    /// Native entry point; must stay the first word
    function: Handle,
    name: CString,
    return_type: *const FixtureType,
    flags: u32,
    params: Vec<FixtureParam>,
    invoker: Option<Invoker>,
    /// Makes the signature lookup return null
    unsigned: Cell<bool>,
}

pub struct FixtureVTable {
    class: *const FixtureClass,
}

pub struct FixtureClass {
    /// `None` makes the name getter fault
    name: Option<CString>,
    namespace: CString,
    parent: *const FixtureClass,
    fields: Vec<Box<FixtureField>>,
    methods: Vec<Box<FixtureMethod>>,
    interfaces: Vec<*const FixtureClass>,
    ty: Box<FixtureType>,
    vtable: FixtureVTable,
}

pub struct FixtureImage {
    name: CString,
    /// Makes the name getter return null
    nameless: Cell<bool>,
    file: CString,
    classes: Vec<*const FixtureClass>,
}

pub struct FixtureAssembly {
    image: Box<FixtureImage>,
}

pub struct FixtureDomain {
    assemblies: Vec<Handle>,
    /// Assemblies that only `mono_domain_assembly_open` can reach
    loadable: Vec<Handle>,
}

pub struct FixtureDesc {
    /// Method name part of a `Class:Method` description
    method: String,
}

#[repr(C)]
struct FixtureBox {
    class: usize,
    value: i64,
}

thread_local! {
    static DOMAIN: Cell<*const FixtureDomain> = const { Cell::new(std::ptr::null()) };
    static CALLS: RefCell<HashMap<&'static str, usize>> = RefCell::new(HashMap::new());
    static ARENA: RefCell<Vec<Box<dyn Any>>> = RefCell::new(Vec::new());
}

fn record(export: &'static str) {
    CALLS.with(|calls| *calls.borrow_mut().entry(export).or_default() += 1);
}

/// Number of times the fixture export `export` ran on this thread
pub fn calls(export: &str) -> usize {
    CALLS.with(|calls| calls.borrow().get(export).copied().unwrap_or(0))
}

fn keep<T: 'static>(value: T) -> *mut T {
    let mut boxed = Box::new(value);
    let ptr = &mut *boxed as *mut T;
    ARENA.with(|arena| arena.borrow_mut().push(boxed));
    ptr
}

fn cstr(text: &str) -> CString {
    CString::new(text).unwrap()
}

/// Owns one fixture host; installs it as the current domain of this thread
pub struct Fixture {
    domain: Box<FixtureDomain>,
    assemblies: Vec<Box<FixtureAssembly>>,
    classes: Vec<Box<FixtureClass>>,
    types: Vec<Box<FixtureType>>,
}

impl Fixture {
    pub fn standard() -> Fixture {
        CALLS.with(|calls| calls.borrow_mut().clear());

        let mut fixture = Fixture {
            domain: Box::new(FixtureDomain {
                assemblies: Vec::new(),
                loadable: Vec::new(),
            }),
            assemblies: Vec::new(),
            classes: Vec::new(),
            types: Vec::new(),
        };

        let void = fixture.ty("System.Void", 0);
        let int = fixture.ty("System.Int32", 4);
        let single = fixture.ty("System.Single", 4);
        let string = fixture.ty("System.String", 8);

        let object = fixture.class(
            Some("Object"),
            "System",
            std::ptr::null(),
            vec![],
            vec![],
            vec![],
        );

        let ithing = fixture.class(
            Some("IThing"),
            "Fixture",
            std::ptr::null(),
            vec![],
            vec![method("Describe", string, PUBLIC, &[], None, None)],
            vec![],
        );

        let foo = fixture.class(
            Some("Foo"),
            "Fixture",
            object,
            vec![
                field("Bar", int, 8, PUBLIC),
                field("Speed", single, 12, PUBLIC),
                field("Count", int, 0, PUBLIC | FIELD_STATIC),
            ],
            vec![
                method("Baz", int, PUBLIC, &[], None, Some(|_, _| Some(5))),
                method(
                    "Answer",
                    int,
                    PUBLIC | METHOD_STATIC,
                    &[],
                    Some(answer as *const ()),
                    None,
                ),
                method(
                    "Add",
                    int,
                    PUBLIC | METHOD_STATIC,
                    &[("a", int), ("b", int)],
                    Some(add as *const ()),
                    Some(invoke_add),
                ),
                method(
                    "GetBar",
                    int,
                    PUBLIC,
                    &[],
                    Some(get_bar as *const ()),
                    Some(invoke_get_bar),
                ),
                method("F", int, PUBLIC, &[("x", int)], None, None),
                method("F", int, PUBLIC, &[("x", int), ("y", single)], None, None),
                method(
                    "Explode",
                    int,
                    PUBLIC | METHOD_STATIC,
                    &[],
                    Some(explode as *const ()),
                    None,
                ),
            ],
            vec![ithing],
        );

        let poisoned = fixture.class(None, "Fixture", object, vec![], vec![], vec![]);
        let qux = fixture.class(
            Some("Qux"),
            "Fixture",
            object,
            vec![field("Value", int, 16, PUBLIC)],
            vec![],
            vec![],
        );
        let other_foo = fixture.class(Some("Foo"), "Other", object, vec![], vec![], vec![]);
        let entry = fixture.class(
            Some("Entry"),
            "Loader",
            object,
            vec![],
            vec![method(
                "Main",
                void,
                PUBLIC | METHOD_STATIC,
                &[],
                None,
                Some(invoke_entry_main),
            )],
            vec![],
        );

        fixture.assembly(
            "Fixture",
            "/game/Managed/Fixture.dll",
            vec![object, ithing, foo, std::ptr::null(), poisoned, qux],
        );
        fixture.assembly("Second", "/game/Managed/Second.dll", vec![other_foo]);
        let plugin = fixture.image("Plugin", "/game/Mods/Plugin.dll", vec![entry]);
        fixture.domain.loadable.push(plugin);

        DOMAIN.with(|d| d.set(&*fixture.domain as *const FixtureDomain));
        fixture
    }

    fn ty(&mut self, name: &str, size: i32) -> *const FixtureType {
        let ty = Box::new(FixtureType {
            name: cstr(name),
            size,
            object: 0,
        });
        let ptr = &*ty as *const FixtureType;
        self.types.push(ty);
        ptr
    }

    fn class(
        &mut self,
        name: Option<&str>,
        namespace: &str,
        parent: *const FixtureClass,
        fields: Vec<Box<FixtureField>>,
        methods: Vec<Box<FixtureMethod>>,
        interfaces: Vec<*const FixtureClass>,
    ) -> *const FixtureClass {
        let full = format!("{namespace}.{}", name.unwrap_or("?"));
        let mut class = Box::new(FixtureClass {
            name: name.map(cstr),
            namespace: cstr(namespace),
            parent,
            fields,
            methods,
            interfaces,
            ty: Box::new(FixtureType {
                name: cstr(&full),
                size: 8,
                object: 0,
            }),
            vtable: FixtureVTable {
                class: std::ptr::null(),
            },
        });
        class.vtable.class = &*class as *const FixtureClass;
        let ptr = &*class as *const FixtureClass;
        self.classes.push(class);
        ptr
    }

    /// Enumerated assembly; image names carry no extension
    fn assembly(&mut self, name: &str, file: &str, classes: Vec<*const FixtureClass>) {
        let handle = self.image(name, file, classes);
        self.domain.assemblies.push(handle);
    }

    fn image(&mut self, name: &str, file: &str, classes: Vec<*const FixtureClass>) -> Handle {
        let assembly = Box::new(FixtureAssembly {
            image: Box::new(FixtureImage {
                name: cstr(name),
                nameless: Cell::new(false),
                file: cstr(file),
                classes,
            }),
        });
        let handle = Handle::from_ptr(&*assembly as *const FixtureAssembly);
        self.assemblies.push(assembly);
        handle
    }

    /// Make the named image report a null name
    pub fn break_image_name(&self, name: &str) {
        self.assemblies
            .iter()
            .filter(|a| a.image.name.to_str().ok() == Some(name))
            .for_each(|a| a.image.nameless.set(true));
    }

    /// Make the Mono signature lookup of `class::method` return null
    pub fn drop_signature(&self, class: &str, method: &str) {
        self.classes
            .iter()
            .filter(|c| c.name.as_deref().and_then(|n| n.to_str().ok()) == Some(class))
            .flat_map(|c| c.methods.iter())
            .filter(|m| m.name.to_str().ok() == Some(method))
            .for_each(|m| m.unsigned.set(true));
    }

    pub fn domain(&self) -> Handle {
        Handle::from_ptr(&*self.domain as *const FixtureDomain)
    }

    /// Symbol source exporting every fixture entry point
    pub fn host(&self) -> (FixtureHost, LookupLog) {
        FixtureHost::new(&[])
    }

    /// Symbol source that leaves out `hidden`
    pub fn host_without(&self, hidden: &[&str]) -> (FixtureHost, LookupLog) {
        FixtureHost::new(hidden)
    }

    /// Current value of a static field by class and field name
    pub fn static_value(&self, class: &str, field: &str) -> Option<i32> {
        self.classes
            .iter()
            .filter(|c| c.name.as_deref().and_then(|n| n.to_str().ok()) == Some(class))
            .flat_map(|c| c.fields.iter())
            .find(|f| f.name.to_str().ok() == Some(field))
            .map(|f| f.value.get())
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        let ours = &*self.domain as *const FixtureDomain;
        DOMAIN.with(|d| {
            if d.get() == ours {
                d.set(std::ptr::null());
            }
        });
    }
}

fn field(name: &str, ty: *const FixtureType, offset: i32, flags: u32) -> Box<FixtureField> {
    Box::new(FixtureField {
        name: cstr(name),
        ty,
        offset,
        flags,
        value: Cell::new(0),
    })
}

fn method(
    name: &str,
    return_type: *const FixtureType,
    flags: u32,
    params: &[(&str, *const FixtureType)],
    function: Option<*const ()>,
    invoker: Option<Invoker>,
) -> Box<FixtureMethod> {
    Box::new(FixtureMethod {
        function: function.map(Handle::from_ptr).unwrap_or(Handle::NULL),
        name: cstr(name),
        return_type,
        flags,
        params: params
            .iter()
            .map(|(name, ty)| FixtureParam {
                name: cstr(name),
                ty: *ty,
            })
            .collect(),
        invoker,
        unsigned: Cell::new(false),
    })
}

// ===== Native method bodies =====

extern "C-unwind" fn answer() -> i32 {
    42
}

extern "C-unwind" fn add(a: i32, b: i32) -> i32 {
    a + b
}

extern "C-unwind" fn get_bar(this: Handle) -> i32 {
    unsafe { *(this.offset(8).as_ptr() as *const i32) }
}

extern "C-unwind" fn explode() -> i32 {
    panic!("fixture method fault")
}

fn invoke_add(_instance: Handle, params: *mut *mut c_void) -> Option<i64> {
    unsafe {
        let a = *(*params as *const i32);
        let b = *(*params.add(1) as *const i32);
        Some((a + b) as i64)
    }
}

fn invoke_get_bar(instance: Handle, _params: *mut *mut c_void) -> Option<i64> {
    Some(get_bar(instance) as i64)
}

fn invoke_entry_main(_instance: Handle, _params: *mut *mut c_void) -> Option<i64> {
    record("entry_main");
    None
}

// ===== Handle casts =====

unsafe fn as_ref<'a, T>(handle: Handle) -> &'a T {
    &*(handle.as_ptr() as *const T)
}

fn name_ptr(text: &CStr) -> *const c_char {
    text.as_ptr()
}

/// Advance an `index + 1` cursor over `items`
unsafe fn advance<T>(
    items: &[T],
    cursor: *mut *mut c_void,
    pick: impl Fn(&T) -> Handle,
) -> Handle {
    let index = *cursor as usize;
    match items.get(index) {
        Some(item) => {
            *cursor = (index + 1) as *mut c_void;
            pick(item)
        }
        None => Handle::NULL,
    }
}

fn current_domain() -> Handle {
    DOMAIN.with(|d| Handle::from_ptr(d.get()))
}

// ===== Shared implementations =====

extern "C-unwind" fn domain_get() -> Handle {
    current_domain()
}

extern "C-unwind" fn thread_attach(_domain: Handle) -> Handle {
    record("thread_attach");
    Handle::from_addr(0x7ead)
}

extern "C-unwind" fn jit_thread_attach(_domain: Handle) -> Handle {
    record("jit_thread_attach");
    Handle::from_addr(0x7ead)
}

extern "C-unwind" fn thread_current() -> Handle {
    Handle::from_addr(0x7ead)
}

extern "C-unwind" fn thread_detach(thread: Handle) {
    assert_eq!(thread, Handle::from_addr(0x7ead));
    record("thread_detach");
}

extern "C-unwind" fn domain_get_assemblies(domain: Handle, size: *mut usize) -> *const Handle {
    let domain = unsafe { as_ref::<FixtureDomain>(domain) };
    unsafe { *size = domain.assemblies.len() };
    domain.assemblies.as_ptr()
}

extern "C-unwind" fn assembly_foreach(visit: AssemblyVisitor, user_data: *mut c_void) {
    let domain = unsafe { as_ref::<FixtureDomain>(current_domain()) };
    for assembly in &domain.assemblies {
        visit(*assembly, user_data);
    }
}

extern "C-unwind" fn assembly_get_image(assembly: Handle) -> Handle {
    let assembly = unsafe { as_ref::<FixtureAssembly>(assembly) };
    Handle::from_ptr(&*assembly.image as *const FixtureImage)
}

extern "C-unwind" fn image_get_name(image: Handle) -> *const c_char {
    let image = unsafe { as_ref::<FixtureImage>(image) };
    if image.nameless.get() {
        return std::ptr::null();
    }
    name_ptr(&image.name)
}

extern "C-unwind" fn image_get_filename(image: Handle) -> *const c_char {
    name_ptr(&unsafe { as_ref::<FixtureImage>(image) }.file)
}

extern "C-unwind" fn image_get_class_count(image: Handle) -> usize {
    unsafe { as_ref::<FixtureImage>(image) }.classes.len()
}

extern "C-unwind" fn image_get_class(image: Handle, index: usize) -> Handle {
    let image = unsafe { as_ref::<FixtureImage>(image) };
    image
        .classes
        .get(index)
        .map(|c| Handle::from_ptr(*c))
        .unwrap_or(Handle::NULL)
}

extern "C-unwind" fn image_get_table_info(image: Handle, table: i32) -> Handle {
    assert_eq!(table, 2, "only the TypeDef table is read");
    image
}

extern "C-unwind" fn table_info_get_rows(table: Handle) -> i32 {
    unsafe { as_ref::<FixtureImage>(table) }.classes.len() as i32
}

extern "C-unwind" fn class_get(image: Handle, token: u32) -> Handle {
    assert_eq!(token & 0xff00_0000, 0x0200_0000, "TypeDef token expected");
    let row = (token & 0x00ff_ffff) as usize;
    image_get_class(image, row - 1)
}

extern "C-unwind" fn class_get_name(class: Handle) -> *const c_char {
    match &unsafe { as_ref::<FixtureClass>(class) }.name {
        Some(name) => name.as_ptr(),
        None => panic!("poisoned class"),
    }
}

extern "C-unwind" fn class_get_namespace(class: Handle) -> *const c_char {
    name_ptr(&unsafe { as_ref::<FixtureClass>(class) }.namespace)
}

extern "C-unwind" fn class_get_parent(class: Handle) -> Handle {
    Handle::from_ptr(unsafe { as_ref::<FixtureClass>(class) }.parent)
}

extern "C-unwind" fn class_get_fields(class: Handle, cursor: *mut *mut c_void) -> Handle {
    let class = unsafe { as_ref::<FixtureClass>(class) };
    unsafe { advance(&class.fields, cursor, |f| Handle::from_ptr(&**f as *const FixtureField)) }
}

extern "C-unwind" fn class_get_methods(class: Handle, cursor: *mut *mut c_void) -> Handle {
    let class = unsafe { as_ref::<FixtureClass>(class) };
    unsafe { advance(&class.methods, cursor, |m| Handle::from_ptr(&**m as *const FixtureMethod)) }
}

extern "C-unwind" fn class_get_interfaces(class: Handle, cursor: *mut *mut c_void) -> Handle {
    let class = unsafe { as_ref::<FixtureClass>(class) };
    unsafe { advance(&class.interfaces, cursor, |i| Handle::from_ptr(*i)) }
}

extern "C-unwind" fn class_get_type(class: Handle) -> Handle {
    let class = unsafe { as_ref::<FixtureClass>(class) };
    Handle::from_ptr(&*class.ty as *const FixtureType)
}

extern "C-unwind" fn class_vtable(_domain: Handle, class: Handle) -> Handle {
    record("mono_class_vtable");
    let class = unsafe { as_ref::<FixtureClass>(class) };
    Handle::from_ptr(&class.vtable as *const FixtureVTable)
}

extern "C-unwind" fn field_get_name(field: Handle) -> *const c_char {
    name_ptr(&unsafe { as_ref::<FixtureField>(field) }.name)
}

extern "C-unwind" fn field_get_type(field: Handle) -> Handle {
    Handle::from_ptr(unsafe { as_ref::<FixtureField>(field) }.ty)
}

extern "C-unwind" fn field_get_offset(field: Handle) -> i32 {
    unsafe { as_ref::<FixtureField>(field) }.offset
}

extern "C-unwind" fn field_get_flags(field: Handle) -> u32 {
    unsafe { as_ref::<FixtureField>(field) }.flags
}

extern "C-unwind" fn il2cpp_field_static_get_value(field: Handle, out: *mut c_void) {
    let field = unsafe { as_ref::<FixtureField>(field) };
    unsafe { *(out as *mut i32) = field.value.get() };
}

extern "C-unwind" fn il2cpp_field_static_set_value(field: Handle, value: *mut c_void) {
    let field = unsafe { as_ref::<FixtureField>(field) };
    field.value.set(unsafe { *(value as *const i32) });
}

extern "C-unwind" fn mono_field_static_get_value(
    vtable: Handle,
    field: Handle,
    out: *mut c_void,
) {
    assert!(!vtable.is_null());
    il2cpp_field_static_get_value(field, out);
}

extern "C-unwind" fn mono_field_static_set_value(
    vtable: Handle,
    field: Handle,
    value: *mut c_void,
) {
    assert!(!vtable.is_null());
    il2cpp_field_static_set_value(field, value);
}

extern "C-unwind" fn method_get_name(method: Handle) -> *const c_char {
    name_ptr(&unsafe { as_ref::<FixtureMethod>(method) }.name)
}

extern "C-unwind" fn method_get_return_type(method: Handle) -> Handle {
    Handle::from_ptr(unsafe { as_ref::<FixtureMethod>(method) }.return_type)
}

extern "C-unwind" fn method_get_flags(method: Handle, impl_flags: *mut u32) -> u32 {
    unsafe { *impl_flags = 0 };
    unsafe { as_ref::<FixtureMethod>(method) }.flags
}

extern "C-unwind" fn method_get_param_count(method: Handle) -> u32 {
    unsafe { as_ref::<FixtureMethod>(method) }.params.len() as u32
}

extern "C-unwind" fn method_get_param_name(method: Handle, index: u32) -> *const c_char {
    let method = unsafe { as_ref::<FixtureMethod>(method) };
    name_ptr(&method.params[index as usize].name)
}

extern "C-unwind" fn method_get_param(method: Handle, index: u32) -> Handle {
    let method = unsafe { as_ref::<FixtureMethod>(method) };
    Handle::from_ptr(method.params[index as usize].ty)
}

extern "C-unwind" fn method_signature(method: Handle) -> Handle {
    // The fixture method doubles as its own signature
    if unsafe { as_ref::<FixtureMethod>(method) }.unsigned.get() {
        return Handle::NULL;
    }
    method
}

extern "C-unwind" fn method_get_param_names(method: Handle, names: *mut *const c_char) {
    let method = unsafe { as_ref::<FixtureMethod>(method) };
    for (index, param) in method.params.iter().enumerate() {
        unsafe { *names.add(index) = param.name.as_ptr() };
    }
}

extern "C-unwind" fn signature_get_params(signature: Handle, cursor: *mut *mut c_void) -> Handle {
    let method = unsafe { as_ref::<FixtureMethod>(signature) };
    unsafe { advance(&method.params, cursor, |p| Handle::from_ptr(p.ty)) }
}

extern "C-unwind" fn type_get_name(ty: Handle) -> *const c_char {
    name_ptr(&unsafe { as_ref::<FixtureType>(ty) }.name)
}

extern "C-unwind" fn type_size(ty: Handle, align: *mut i32) -> i32 {
    let ty = unsafe { as_ref::<FixtureType>(ty) };
    unsafe { *align = ty.size.max(1) };
    ty.size
}

extern "C-unwind" fn il2cpp_type_get_object(ty: Handle) -> Handle {
    record("type_get_object");
    let ty = unsafe { as_ref::<FixtureType>(ty) };
    Handle::from_ptr(&ty.object as *const u8)
}

extern "C-unwind" fn mono_type_get_object(_domain: Handle, ty: Handle) -> Handle {
    il2cpp_type_get_object(ty)
}

extern "C-unwind" fn il2cpp_object_new(class: Handle) -> Handle {
    let object = keep([0u64; OBJECT_SIZE / 8]);
    unsafe { *(object as *mut usize) = class.addr() };
    Handle::from_ptr(object)
}

extern "C-unwind" fn mono_object_new(_domain: Handle, class: Handle) -> Handle {
    il2cpp_object_new(class)
}

extern "C-unwind" fn object_unbox(object: Handle) -> Handle {
    object.offset(std::mem::size_of::<usize>() as isize)
}

extern "C-unwind" fn il2cpp_string_new(text: *const c_char) -> Handle {
    let copy = unsafe { CStr::from_ptr(text) }.to_owned();
    let stored = keep(copy);
    Handle::from_ptr(unsafe { (*stored).as_ptr() })
}

extern "C-unwind" fn mono_string_new(_domain: Handle, text: *const c_char) -> Handle {
    il2cpp_string_new(text)
}

extern "C-unwind" fn compile_method(method: Handle) -> Handle {
    record("mono_compile_method");
    unsafe { as_ref::<FixtureMethod>(method) }.function
}

extern "C-unwind" fn runtime_invoke(
    method: Handle,
    instance: Handle,
    params: *mut *mut c_void,
    exception: *mut Handle,
) -> Handle {
    assert!(exception.is_null(), "exceptions are never requested");
    let method = unsafe { as_ref::<FixtureMethod>(method) };
    if method.params.is_empty() {
        assert!(params.is_null(), "empty argument lists are passed as null");
    }

    match method.invoker.and_then(|invoke| invoke(instance, params)) {
        Some(value) => Handle::from_ptr(keep(FixtureBox { class: 0, value })),
        None => Handle::NULL,
    }
}

// ===== Assembly loading =====

extern "C-unwind" fn domain_assembly_open(domain: Handle, path: *const c_char) -> Handle {
    record("mono_domain_assembly_open");
    let domain = unsafe { as_ref::<FixtureDomain>(domain) };
    let path = unsafe { CStr::from_ptr(path) };
    domain
        .loadable
        .iter()
        .copied()
        .find(|a| unsafe { as_ref::<FixtureAssembly>(*a) }.image.file.as_c_str() == path)
        .unwrap_or(Handle::NULL)
}

extern "C-unwind" fn class_from_name(
    image: Handle,
    namespace: *const c_char,
    name: *const c_char,
) -> Handle {
    let image = unsafe { as_ref::<FixtureImage>(image) };
    let (namespace, name) = unsafe { (CStr::from_ptr(namespace), CStr::from_ptr(name)) };
    image
        .classes
        .iter()
        .filter(|c| !c.is_null())
        .find(|c| {
            let class = unsafe { &***c };
            class.namespace.as_c_str() == namespace && class.name.as_deref() == Some(name)
        })
        .map(|c| Handle::from_ptr(*c))
        .unwrap_or(Handle::NULL)
}

extern "C-unwind" fn method_desc_new(desc: *const c_char, include_namespace: i32) -> Handle {
    assert_eq!(include_namespace, 1, "descriptions are namespace-qualified");
    record("mono_method_desc_new");
    let desc = unsafe { CStr::from_ptr(desc) }.to_string_lossy();
    let method = desc.rsplit(':').next().unwrap_or_default();
    let method = method.split('(').next().unwrap_or_default().to_string();
    Handle::from_ptr(keep(FixtureDesc { method }))
}

extern "C-unwind" fn method_desc_search_in_class(desc: Handle, class: Handle) -> Handle {
    let desc = unsafe { as_ref::<FixtureDesc>(desc) };
    let class = unsafe { as_ref::<FixtureClass>(class) };
    class
        .methods
        .iter()
        .find(|m| m.name.to_str().ok() == Some(desc.method.as_str()))
        .map(|m| Handle::from_ptr(&**m as *const FixtureMethod))
        .unwrap_or(Handle::NULL)
}

extern "C-unwind" fn method_desc_free(desc: Handle) {
    assert!(!desc.is_null());
    record("mono_method_desc_free");
}

// ===== Export table =====

fn export_table() -> Vec<(&'static str, *const ())> {
    vec![
        // Il2Cpp family
        ("il2cpp_domain_get", domain_get as *const ()),
        ("il2cpp_domain_get_assemblies", domain_get_assemblies as *const ()),
        ("il2cpp_thread_attach", thread_attach as *const ()),
        ("il2cpp_thread_current", thread_current as *const ()),
        ("il2cpp_thread_detach", thread_detach as *const ()),
        ("il2cpp_assembly_get_image", assembly_get_image as *const ()),
        ("il2cpp_image_get_name", image_get_name as *const ()),
        ("il2cpp_image_get_filename", image_get_filename as *const ()),
        ("il2cpp_image_get_class_count", image_get_class_count as *const ()),
        ("il2cpp_image_get_class", image_get_class as *const ()),
        ("il2cpp_class_get_name", class_get_name as *const ()),
        ("il2cpp_class_get_namespace", class_get_namespace as *const ()),
        ("il2cpp_class_get_parent", class_get_parent as *const ()),
        ("il2cpp_class_get_fields", class_get_fields as *const ()),
        ("il2cpp_class_get_methods", class_get_methods as *const ()),
        ("il2cpp_class_get_interfaces", class_get_interfaces as *const ()),
        ("il2cpp_class_get_type", class_get_type as *const ()),
        ("il2cpp_field_get_name", field_get_name as *const ()),
        ("il2cpp_field_get_type", field_get_type as *const ()),
        ("il2cpp_field_get_offset", field_get_offset as *const ()),
        ("il2cpp_field_static_get_value", il2cpp_field_static_get_value as *const ()),
        ("il2cpp_field_static_set_value", il2cpp_field_static_set_value as *const ()),
        ("il2cpp_method_get_name", method_get_name as *const ()),
        ("il2cpp_method_get_return_type", method_get_return_type as *const ()),
        ("il2cpp_method_get_flags", method_get_flags as *const ()),
        ("il2cpp_method_get_param_count", method_get_param_count as *const ()),
        ("il2cpp_method_get_param_name", method_get_param_name as *const ()),
        ("il2cpp_method_get_param", method_get_param as *const ()),
        ("il2cpp_type_get_name", type_get_name as *const ()),
        ("il2cpp_type_get_object", il2cpp_type_get_object as *const ()),
        ("il2cpp_object_new", il2cpp_object_new as *const ()),
        ("il2cpp_object_unbox", object_unbox as *const ()),
        ("il2cpp_string_new", il2cpp_string_new as *const ()),
        ("il2cpp_runtime_invoke", runtime_invoke as *const ()),
        // Mono family
        ("mono_get_root_domain", domain_get as *const ()),
        ("mono_thread_attach", thread_attach as *const ()),
        ("mono_jit_thread_attach", jit_thread_attach as *const ()),
        ("mono_thread_current", thread_current as *const ()),
        ("mono_thread_detach", thread_detach as *const ()),
        ("mono_assembly_foreach", assembly_foreach as *const ()),
        ("mono_assembly_get_image", assembly_get_image as *const ()),
        ("mono_image_get_name", image_get_name as *const ()),
        ("mono_image_get_filename", image_get_filename as *const ()),
        ("mono_image_get_table_info", image_get_table_info as *const ()),
        ("mono_table_info_get_rows", table_info_get_rows as *const ()),
        ("mono_class_get", class_get as *const ()),
        ("mono_class_get_name", class_get_name as *const ()),
        ("mono_class_get_namespace", class_get_namespace as *const ()),
        ("mono_class_get_parent", class_get_parent as *const ()),
        ("mono_class_get_fields", class_get_fields as *const ()),
        ("mono_class_get_methods", class_get_methods as *const ()),
        ("mono_class_get_interfaces", class_get_interfaces as *const ()),
        ("mono_class_get_type", class_get_type as *const ()),
        ("mono_class_vtable", class_vtable as *const ()),
        ("mono_field_get_name", field_get_name as *const ()),
        ("mono_field_get_type", field_get_type as *const ()),
        ("mono_field_get_offset", field_get_offset as *const ()),
        ("mono_field_get_flags", field_get_flags as *const ()),
        ("mono_field_static_get_value", mono_field_static_get_value as *const ()),
        ("mono_field_static_set_value", mono_field_static_set_value as *const ()),
        ("mono_method_signature", method_signature as *const ()),
        ("mono_method_get_name", method_get_name as *const ()),
        ("mono_method_get_flags", method_get_flags as *const ()),
        ("mono_method_get_param_names", method_get_param_names as *const ()),
        ("mono_signature_get_return_type", method_get_return_type as *const ()),
        ("mono_signature_get_param_count", method_get_param_count as *const ()),
        ("mono_signature_get_params", signature_get_params as *const ()),
        ("mono_type_get_name", type_get_name as *const ()),
        ("mono_type_size", type_size as *const ()),
        ("mono_type_get_object", mono_type_get_object as *const ()),
        ("mono_object_new", mono_object_new as *const ()),
        ("mono_object_unbox", object_unbox as *const ()),
        ("mono_string_new", mono_string_new as *const ()),
        ("mono_compile_method", compile_method as *const ()),
        ("mono_runtime_invoke", runtime_invoke as *const ()),
        ("mono_domain_assembly_open", domain_assembly_open as *const ()),
        ("mono_class_from_name", class_from_name as *const ()),
        ("mono_method_desc_new", method_desc_new as *const ()),
        ("mono_method_desc_search_in_class", method_desc_search_in_class as *const ()),
        ("mono_method_desc_free", method_desc_free as *const ()),
    ]
}

/// Per-name lookup counts, shared with the host after it is moved into a catalog
#[derive(Clone, Default)]
pub struct LookupLog(Arc<Mutex<HashMap<String, usize>>>);

impl LookupLog {
    pub fn count(&self, name: &str) -> usize {
        self.0.lock().get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.lock().values().sum()
    }
}

/// Instrumented symbol source over the fixture export table
pub struct FixtureHost {
    exports: HashMap<&'static str, Handle>,
    log: LookupLog,
}

impl FixtureHost {
    fn new(hidden: &[&str]) -> (FixtureHost, LookupLog) {
        let hidden: HashSet<&str> = hidden.iter().copied().collect();
        let exports = export_table()
            .into_iter()
            .filter(|(name, _)| !hidden.contains(name))
            .map(|(name, address)| (name, Handle::from_ptr(address)))
            .collect();
        let log = LookupLog::default();
        (
            FixtureHost {
                exports,
                log: log.clone(),
            },
            log,
        )
    }

    /// Names of every export this host provides
    pub fn exported_names() -> Vec<&'static str> {
        export_table().into_iter().map(|(name, _)| name).collect()
    }
}

impl SymbolSource for FixtureHost {
    fn lookup(&self, name: &str) -> Option<Handle> {
        *self.log.0.lock().entry(name.to_string()).or_default() += 1;
        self.exports.get(name).copied()
    }

    fn describe(&self) -> String {
        format!("fixture host ({} exports)", self.exports.len())
    }
}
