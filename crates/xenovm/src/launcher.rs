//! Launching a [`Vm`] through the [`Launcher`] boundary.

use std::path::Path;
use std::sync::Arc;

use xenoabi::ForeignRuntime;
use xenoabi::LaunchError;
use xenoabi::Launcher;

use crate::class::ClassBuilder;
use crate::vm::Vm;
use crate::vm::VmOptions;

/// Starts a [`Vm`] for a runtime library path.
///
/// The library file must exist, mirroring a loader that has to open it.
/// Extra classes registered with [`VmLauncher::with_class`] are defined
/// right after the standard library.
#[derive(Clone, Default)]
pub struct VmLauncher {
    classes: Vec<ClassBuilder>,
}

impl VmLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: ClassBuilder) -> Self {
        self.classes.push(class);
        self
    }
}

impl Launcher for VmLauncher {
    fn launch(&self, library: &Path, options: &[String]) -> Result<Arc<dyn ForeignRuntime>, LaunchError> {
        if !library.is_file() {
            return Err(LaunchError::LibraryNotFound(library.to_path_buf()));
        }

        let options = VmOptions::parse(options);
        let vm = Vm::with_options(&options).map_err(|e| LaunchError::Rejected(e.to_string()))?;
        for class in &self.classes {
            vm.define(class.clone()).map_err(|e| LaunchError::Rejected(e.to_string()))?;
        }

        tracing::info!(
            library = %library.display(),
            properties = options.properties.len(),
            ignored = options.ignored.len(),
            "runtime launched"
        );
        Ok(Arc::new(vm))
    }
}
