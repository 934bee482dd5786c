//! One-shot metadata walk
//!
//! Visits every assembly, class, field and method the backend reports and
//! materializes them into catalog entities. Failures are isolated per entity:
//! a class whose name cannot be read is dropped, its siblings are not.

use super::model::{Assembly, Class, RawField, RawMethod};
use crate::backend::MetadataBackend;
use crate::error::WalkResult;
use crate::ffi::Handle;
use std::sync::Arc;

/// Counters collected during the walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub assemblies: usize,
    pub classes: usize,
    pub fields: usize,
    pub methods: usize,
    /// Entities abandoned because materializing them failed
    pub skipped: usize,
}

pub(crate) struct CatalogBuilder<'a> {
    backend: &'a dyn MetadataBackend,
    stats: WalkStats,
}

impl<'a> CatalogBuilder<'a> {
    pub(crate) fn new(backend: &'a dyn MetadataBackend) -> Self {
        Self {
            backend,
            stats: WalkStats::default(),
        }
    }

    pub(crate) fn build(mut self) -> (Vec<Arc<Assembly>>, WalkStats) {
        let span = tracing::info_span!("catalog_walk", mode = %self.backend.mode());
        let _enter = span.enter();

        let assemblies: Vec<Arc<Assembly>> = self
            .backend
            .assemblies()
            .into_iter()
            .filter_map(|handle| self.assembly(handle))
            .collect();

        let stats = self.stats;
        tracing::info!(
            assemblies = stats.assemblies,
            classes = stats.classes,
            fields = stats.fields,
            methods = stats.methods,
            skipped = stats.skipped,
            "catalog built"
        );
        (assemblies, stats)
    }

    fn assembly(&mut self, handle: Handle) -> Option<Arc<Assembly>> {
        let info = self.isolate("assembly", handle, |b| b.assembly_info(handle))?;

        let span = tracing::info_span!("assembly", name = %info.name);
        let _enter = span.enter();

        let classes = self
            .backend
            .classes(info.image)
            .into_iter()
            .filter_map(|class| self.class(class))
            .collect();

        self.stats.assemblies += 1;
        Some(Arc::new(Assembly {
            handle,
            image: info.image,
            name: info.name,
            file: info.file,
            classes,
        }))
    }

    fn class(&mut self, handle: Handle) -> Option<Arc<Class>> {
        let info = self.isolate("class", handle, |b| b.class_info(handle))?;

        let mut fields = self.fields_of(handle);
        let mut methods = self.methods_of(handle);
        for interface in self.backend.interfaces(handle) {
            fields.extend(self.fields_of(interface));
            methods.extend(self.methods_of(interface));
        }

        tracing::trace!(class = %info.name, fields = fields.len(), methods = methods.len());
        self.stats.classes += 1;
        self.stats.fields += fields.len();
        self.stats.methods += methods.len();
        Some(Class::assemble(handle, info, fields, methods))
    }

    fn fields_of(&mut self, owner: Handle) -> Vec<RawField> {
        self.backend
            .fields(owner)
            .into_iter()
            .filter_map(|field| self.isolate("field", field, |b| b.field_info(field)))
            .collect()
    }

    fn methods_of(&mut self, owner: Handle) -> Vec<RawMethod> {
        self.backend
            .methods(owner)
            .into_iter()
            .filter_map(|method| self.isolate("method", method, |b| b.method_info(method)))
            .collect()
    }

    /// Run one entity's construction, dropping it on failure
    fn isolate<T>(
        &mut self,
        kind: &'static str,
        handle: Handle,
        build: impl FnOnce(&dyn MetadataBackend) -> WalkResult<T>,
    ) -> Option<T> {
        match build(self.backend) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(kind, %handle, error = %e, "skipping entity");
                self.stats.skipped += 1;
                None
            }
        }
    }
}
