//! # Kernel Libraries
//!
//! A library is one WGSL compilation unit. Loading it:
//!
//! 1. parses and validates the source with `naga` (diagnostics are rendered
//!    against the source text and returned as a [`CompilationError`]),
//! 2. reflects every `@compute` entry point: its name, its workgroup size and
//!    the `@group(0)` bindings it actually uses,
//! 3. creates the backend shader module under a validation scope,
//! 4. appends the library and indexes its kernels by name.
//!
//! Nothing is committed unless all four steps succeed.
//!
//! ## Name resolution
//!
//! Later libraries override earlier ones for same-named kernels. Lookups are a
//! single hash probe.

use std::collections::HashMap;

use crate::engine::error::CompilationError;
use crate::engine::types::SlotIndex;
use crate::gpu::context::GPUContext;

/// Reflection data for one compute entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelInfo {
    /// Entry point name.
    pub name: String,

    /// `@workgroup_size` declared by the kernel, x-first.
    pub workgroup_size: [u32; 3],

    /// `@group(0)` bindings referenced by the kernel, ascending.
    pub bindings: Vec<SlotIndex>,
}

impl KernelInfo {
    /// Number of argument slots the kernel needs (highest used binding + 1).
    pub fn required_slots(&self) -> usize {
        self.bindings.last().map_or(0, |&b| b as usize + 1)
    }
}

/// Parses and validates WGSL, returning the compute kernels it exports.
///
/// Pure front-end work; no device is needed.
pub fn reflect_kernels(source: &str) -> Result<Vec<KernelInfo>, CompilationError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| CompilationError::new(e.emit_to_string(source)))?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| CompilationError::new(e.emit_to_string(source)))?;

    let mut kernels = Vec::new();
    for (index, entry) in module.entry_points.iter().enumerate() {
        if entry.stage != naga::ShaderStage::Compute {
            continue;
        }

        let usage = info.get_entry_point(index);
        let mut bindings: Vec<SlotIndex> = module
            .global_variables
            .iter()
            .filter(|(handle, _)| !usage[*handle].is_empty())
            .filter_map(|(_, var)| var.binding.as_ref())
            .filter(|binding| binding.group == 0)
            .map(|binding| binding.binding)
            .collect();
        bindings.sort_unstable();
        bindings.dedup();

        kernels.push(KernelInfo {
            name: entry.name.clone(),
            workgroup_size: entry.workgroup_size,
            bindings,
        });
    }

    Ok(kernels)
}

/// One loaded compilation unit.
#[derive(Debug)]
pub struct Library {
    /// Backend shader module.
    pub module: wgpu::ShaderModule,

    /// Compute kernels exported by `module`.
    pub kernels: Vec<KernelInfo>,
}

/// Append-only list of libraries plus the kernel name index.
#[derive(Debug, Default)]
pub struct LibraryRegistry {
    libraries: Vec<Library>,
    function_to_library: HashMap<String, (usize, usize)>,
}

impl LibraryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles `source` and registers its kernels.
    ///
    /// Returns the names of the kernels the library exports.
    pub fn load(&mut self, context: &GPUContext, source: &str) -> Result<Vec<String>, CompilationError> {
        let kernels = reflect_kernels(source)?;

        let module = context
            .scoped(|device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("batch_compute_library"),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                })
            })
            .map_err(CompilationError::new)?;

        let library_index = self.libraries.len();
        let names: Vec<String> = kernels.iter().map(|k| k.name.clone()).collect();
        for (kernel_index, name) in names.iter().enumerate() {
            if let Some((previous, _)) = self
                .function_to_library
                .insert(name.clone(), (library_index, kernel_index))
            {
                log::debug!("kernel '{name}' from library {previous} overridden by library {library_index}");
            }
        }
        self.libraries.push(Library { module, kernels });

        Ok(names)
    }

    /// Whether any loaded library exports `name`.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.function_to_library.contains_key(name)
    }

    /// Owning library and reflection data for `name`.
    pub fn resolve(&self, name: &str) -> Option<(&Library, &KernelInfo)> {
        let &(library, kernel) = self.function_to_library.get(name)?;
        let library = &self.libraries[library];
        Some((library, &library.kernels[kernel]))
    }

    /// All indexed kernel names, sorted.
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.function_to_library.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of loaded libraries.
    #[inline]
    pub fn len(&self) -> usize {
        self.libraries.len()
    }
}
