//! Name lookup over the catalog
//!
//! Identity is always the name string, never the host address. The wildcard
//! token [`WILDCARD`] disables a qualifier.

use super::model::{Assembly, Class, Field, Method};
use super::Catalog;
use std::sync::Arc;

/// Matches any namespace, parent or parameter type
pub const WILDCARD: &str = "*";

/// Assembly name without its `.dll` extension
fn assembly_stem(name: &str) -> &str {
    name.strip_suffix(".dll").unwrap_or(name)
}

fn qualifier_matches(wanted: &str, actual: &str) -> bool {
    wanted == WILDCARD || wanted == actual
}

/// Exact overload test: same arity and every position equal, empty or `*`
pub(crate) fn signature_matches(method: &Method, arg_types: &[&str]) -> bool {
    method.args.len() == arg_types.len()
        && method
            .args
            .iter()
            .zip(arg_types)
            .all(|(arg, wanted)| wanted.is_empty() || qualifier_matches(wanted, &arg.ty.name))
}

impl Catalog {
    /// Find an assembly by name.
    ///
    /// Il2Cpp hosts report image names with their `.dll` extension and Mono
    /// hosts without it, so `Assembly-CSharp` and `Assembly-CSharp.dll` both
    /// match either form. An exact match wins over a stem match.
    pub fn get_assembly(&self, name: &str) -> Option<&Arc<Assembly>> {
        let stem = assembly_stem(name);
        self.assemblies
            .iter()
            .find(|a| a.name == name)
            .or_else(|| self.assemblies.iter().find(|a| assembly_stem(&a.name) == stem))
    }

    /// First class with this name and namespace across all assemblies
    pub fn find_class(&self, name: &str, namespace: &str) -> Option<&Arc<Class>> {
        self.assemblies
            .iter()
            .find_map(|a| a.get_class(name, namespace, WILDCARD))
    }
}

impl Assembly {
    /// Find a class by name, optionally narrowed by namespace and parent name
    pub fn get_class(&self, name: &str, namespace: &str, parent: &str) -> Option<&Arc<Class>> {
        self.classes.iter().find(|c| {
            c.name == name
                && qualifier_matches(namespace, &c.namespace)
                && qualifier_matches(parent, &c.parent)
        })
    }

    /// Find a class by name in any namespace
    pub fn class(&self, name: &str) -> Option<&Arc<Class>> {
        self.get_class(name, WILDCARD, WILDCARD)
    }
}

impl Class {
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Instance offset of a field by name
    pub fn field_offset(&self, name: &str) -> Option<i32> {
        self.get_field(name).map(|f| f.offset)
    }

    /// Find a method by name and parameter type names.
    ///
    /// Prefers an overload whose arity and parameter types match `arg_types`;
    /// an empty or `*` entry matches any type. Without such an overload the
    /// first method of that name is returned.
    pub fn get_method(&self, name: &str, arg_types: &[&str]) -> Option<&Method> {
        let mut by_name = self.methods.iter().filter(|m| m.name == name);
        let first = by_name.clone().next();
        by_name
            .find(|m| signature_matches(m, arg_types))
            .or(first)
    }
}
