//! Native module loading via `libloading`.
//!
//! A [`LoadedModule`] owns both the OS library handle and the plugin
//! instance created from it. The instance is declared first so it is
//! dropped first: its vtable and code live inside the library, so the
//! library must stay mapped until the instance is gone.

use std::fmt;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::contract::{
    Plugin, PluginDeclaration, ABI_VERSION, PLUGIN_API_VERSION, PLUGIN_DECLARATION_SYMBOL,
};
use crate::error::LoadError;

/// Turns a file path into a live plugin instance.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedModule, LoadError>;
}

/// A plugin instance together with the library that backs it.
pub struct LoadedModule {
    // Field order matters: `instance` must drop before `library`.
    instance: Box<dyn Plugin>,
    library: Option<Library>,
    path: PathBuf,
}

impl LoadedModule {
    /// Wrap an instance that is linked into the host (no library to keep
    /// mapped).
    pub fn from_instance(instance: Box<dyn Plugin>, path: impl Into<PathBuf>) -> Self {
        Self {
            instance,
            library: None,
            path: path.into(),
        }
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.instance.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this module keeps a dynamic library mapped.
    pub fn is_dynamic(&self) -> bool {
        self.library.is_some()
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("dynamic", &self.library.is_some())
            .finish_non_exhaustive()
    }
}

/// Loads `cdylib` plugins exporting [`PluginDeclaration`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for NativeLoader {
    fn load(&self, path: &Path) -> Result<LoadedModule, LoadError> {
        // SAFETY: loading a library runs its initializers. Plugins run with
        // full host privileges; the caller chose to trust `path`.
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        // SAFETY: the symbol is a `PluginDeclaration` static emitted by
        // `declare_plugin!`. It is copied out while `library` is alive.
        let declaration: PluginDeclaration = unsafe {
            let symbol = library
                .get::<*const PluginDeclaration>(PLUGIN_DECLARATION_SYMBOL.as_bytes())
                .map_err(|_| LoadError::NoEntryPoint {
                    path: path.to_path_buf(),
                    symbol: PLUGIN_DECLARATION_SYMBOL.to_string(),
                })?;
            if symbol.is_null() {
                return Err(LoadError::NoEntryPoint {
                    path: path.to_path_buf(),
                    symbol: PLUGIN_DECLARATION_SYMBOL.to_string(),
                });
            }
            symbol.read()
        };

        check_declaration(&declaration, path)?;

        let create = declaration.create;
        let instance = std::panic::catch_unwind(create).map_err(|_| LoadError::InvalidInterface {
            path: path.to_path_buf(),
            reason: "plugin factory panicked".to_string(),
        })?;

        tracing::debug!(path = %path.display(), "library opened and plugin instance created");

        Ok(LoadedModule {
            instance,
            library: Some(library),
            path: path.to_path_buf(),
        })
    }
}

/// Reject declarations built against a different contract layout.
fn check_declaration(declaration: &PluginDeclaration, path: &Path) -> Result<(), LoadError> {
    if declaration.abi_version != ABI_VERSION {
        return Err(LoadError::InvalidInterface {
            path: path.to_path_buf(),
            reason: format!(
                "plugin ABI version {}, host expects {ABI_VERSION}",
                declaration.abi_version
            ),
        });
    }
    if declaration.api_version != PLUGIN_API_VERSION {
        return Err(LoadError::InvalidInterface {
            path: path.to_path_buf(),
            reason: format!(
                "plugin built against darkplay-plugin {}, host runs {PLUGIN_API_VERSION}",
                declaration.api_version
            ),
        });
    }
    Ok(())
}
