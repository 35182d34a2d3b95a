//! Module loading and export calls on top of wasmtime.

use std::sync::Arc;
use tracing::debug;
use wasmtime::{
    Engine, Instance, Linker, Memory, Module, Store, TypedFunc, WasmParams, WasmResults,
};

use crate::config::BridgeConfig;
use crate::host::{self, HostState, LogSink};
use crate::{Error, ModuleSource, Result};

/// One instantiated module plus the exports the host relies on.
///
/// Every operation takes the bridge explicitly, so independent bridges can
/// coexist (one per test, for instance). Views borrow it shared; anything that
/// may run module code or grow memory borrows it exclusively.
pub struct Bridge {
    pub(crate) store: Store<HostState>,
    pub(crate) memory: Memory,
    instance: Instance,
    alloc: TypedFunc<(u32, u32), u32>,
    dealloc: TypedFunc<(u32, u32, u32), ()>,
}

impl Bridge {
    /// Fetches module bytes from `source`, instantiates them and runs the
    /// init export once. Nothing is called if any step fails.
    pub async fn load<S>(source: &S, sink: Arc<dyn LogSink>, config: BridgeConfig) -> Result<Self>
    where
        S: ModuleSource + ?Sized,
    {
        let bytes = source.fetch().await.map_err(Error::Fetch)?;
        debug!(bytes = bytes.len(), "module fetched");
        Self::instantiate(&bytes, sink, &config)
    }

    /// Compiles and instantiates `bytes` (binary or text format), then runs
    /// the init export once.
    pub fn instantiate(bytes: &[u8], sink: Arc<dyn LogSink>, config: &BridgeConfig) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::Compile("empty module".to_string()));
        }

        let engine =
            Engine::new(&config.engine_config()).map_err(|e| Error::Compile(format!("{e:#}")))?;
        let module = Module::new(&engine, bytes).map_err(|e| Error::Compile(format!("{e:#}")))?;

        let mut linker = Linker::new(&engine);
        host::define_imports(&mut linker, &config.import_module)
            .map_err(|e| Error::Instantiate(format!("{e:#}")))?;

        let mut store = Store::new(&engine, HostState::new(sink));
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| Error::Instantiate(format!("{e:#}")))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| Error::MissingExport("memory".to_string()))?;
        let alloc = instance
            .get_typed_func::<(u32, u32), u32>(&mut store, "alloc")
            .map_err(|_| Error::MissingExport("alloc".to_string()))?;
        let dealloc = instance
            .get_typed_func::<(u32, u32, u32), ()>(&mut store, "dealloc")
            .map_err(|_| Error::MissingExport("dealloc".to_string()))?;
        let init = instance
            .get_typed_func::<(), ()>(&mut store, &config.init_export)
            .map_err(|_| Error::MissingExport(config.init_export.clone()))?;

        debug!(memory = memory.data_size(&store), "module instantiated");
        init.call(&mut store, ())
            .map_err(|e| Error::Init(format!("{e:#}")))?;
        debug!(export = %config.init_export, "module initialized");

        Ok(Self {
            store,
            memory,
            instance,
            alloc,
            dealloc,
        })
    }

    /// Calls a `() -> ()` export.
    pub fn invoke(&mut self, export: &str) -> Result<()> {
        self.call::<(), ()>(export, ())
    }

    /// Calls an export with a typed signature.
    pub fn call<P, R>(&mut self, export: &str, params: P) -> Result<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self
            .instance
            .get_typed_func::<P, R>(&mut self.store, export)
            .map_err(|_| Error::MissingExport(export.to_string()))?;
        func.call(&mut self.store, params)
            .map_err(|e| call_error(export, e))
    }

    pub(crate) fn call_alloc(&mut self, size: u32, align: u32) -> wasmtime::Result<u32> {
        self.alloc.call(&mut self.store, (size, align))
    }

    pub(crate) fn call_dealloc(&mut self, size: u32, align: u32, offset: u32) -> Result<()> {
        self.dealloc
            .call(&mut self.store, (size, align, offset))
            .map_err(|e| call_error("dealloc", e))
    }
}

pub(crate) fn call_error(export: &str, err: wasmtime::Error) -> Error {
    Error::Call {
        export: export.to_string(),
        message: format!("{err:#}"),
    }
}
