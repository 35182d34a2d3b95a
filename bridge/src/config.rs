//! Bridge configuration.

pub use wasmtime::OptLevel;

/// Import module the guest's log functions are declared in.
pub const DEFAULT_IMPORT_MODULE: &str = "env";

/// Export invoked once right after instantiation.
pub const DEFAULT_INIT_EXPORT: &str = "init";

/// Knobs for compiling and wiring a module.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Cranelift optimization level.
    pub opt_level: OptLevel,
    /// Module name the `console_log` / `console_error` imports live under.
    pub import_module: String,
    /// Name of the export called once after instantiation.
    pub init_export: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Speed,
            import_module: DEFAULT_IMPORT_MODULE.to_string(),
            init_export: DEFAULT_INIT_EXPORT.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_import_module(mut self, name: impl Into<String>) -> Self {
        self.import_module = name.into();
        self
    }

    pub fn with_init_export(mut self, name: impl Into<String>) -> Self {
        self.init_export = name.into();
        self
    }

    pub(crate) fn engine_config(&self) -> wasmtime::Config {
        let mut config = wasmtime::Config::new();
        config.cranelift_opt_level(self.opt_level);
        config
    }
}
