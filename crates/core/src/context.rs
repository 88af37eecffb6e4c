// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::field::{CollectMode, Severity};
use crate::module::{Module, ModuleParams};
use crate::self_test::SelfTestConfig;
use crate::{CollectError, ModuleInitError};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// A counted hardware error, handed to the global error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEvent<'a> {
    pub module: &'a str,
    pub field_id: u32,
    pub field_name: &'a str,
    pub severity: Severity,
    /// Events added by this report.
    pub count: u32,
    /// Field counter after the update.
    pub counter: u32,
}

type ErrorCallback = Box<dyn Fn(&ErrorEvent<'_>) + Send + Sync>;
type PrintSink = Box<dyn Fn(&str) + Send + Sync>;

/// Process-wide callbacks and the global auto-mask threshold.
pub struct Handle {
    error_threshold: Option<u32>,
    on_error: Option<ErrorCallback>,
    print_sink: Option<PrintSink>,
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("error_threshold", &self.error_threshold)
            .field("on_error", &self.on_error.is_some())
            .field("print_sink", &self.print_sink.is_some())
            .finish()
    }
}

impl Handle {
    pub fn new() -> Self {
        Self {
            error_threshold: None,
            on_error: None,
            print_sink: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Option<u32>) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_error_callback<F>(mut self, cb: F) -> Self
    where
        F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Replaces the default sink, which forwards every line to `tracing`.
    pub fn with_print_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.print_sink = Some(Box::new(sink));
        self
    }

    pub fn error_threshold(&self) -> Option<u32> {
        self.error_threshold
    }

    pub fn set_error_threshold(&mut self, threshold: Option<u32>) {
        self.error_threshold = threshold;
    }

    pub fn notify(&self, event: &ErrorEvent<'_>) {
        if let Some(cb) = &self.on_error {
            cb(event);
        }
    }

    pub fn print(&self, line: &str) {
        match &self.print_sink {
            Some(sink) => sink(line),
            None => info!("{}", line),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldReport {
    pub id: u32,
    pub name: String,
    pub counter: u32,
    pub valid: bool,
    pub severity: Severity,
    pub collect_mode: CollectMode,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModuleReport {
    pub name: String,
    pub enabled: bool,
    pub fields: Vec<FieldReport>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ContextReport {
    pub error_threshold: Option<u32>,
    pub modules: Vec<ModuleReport>,
}

impl ContextReport {
    pub fn total_errors(&self) -> u64 {
        self.modules
            .iter()
            .flat_map(|m| m.fields.iter())
            .map(|f| f.counter as u64)
            .sum()
    }
}

/// Owns the registered modules, in registration order, together with the
/// handle they report through.
#[derive(Debug, Default)]
pub struct Context {
    handle: Handle,
    modules: Vec<Module>,
    self_test: SelfTestConfig,
}

impl Context {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            modules: Vec::new(),
            self_test: SelfTestConfig::default(),
        }
    }

    pub fn with_self_test(mut self, config: SelfTestConfig) -> Self {
        self.self_test = config;
        self
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut Handle {
        &mut self.handle
    }

    pub fn self_test_config(&self) -> &SelfTestConfig {
        &self.self_test
    }

    /// Builds a module from `params` and registers it. Returns its index.
    pub fn init_module(&mut self, params: ModuleParams) -> Result<usize, ModuleInitError> {
        let module = Module::new(params)?;
        self.register(module)
    }

    /// Appends an already constructed module. Names must be unique.
    pub fn register(&mut self, module: Module) -> Result<usize, ModuleInitError> {
        if self.modules.iter().any(|m| m.name() == module.name()) {
            return Err(ModuleInitError::DuplicateModule(module.name().to_string()));
        }
        info!(module = module.name(), fields = module.fields().len(), "Registered module");
        self.modules.push(module);
        Ok(self.modules.len() - 1)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name() == name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.name() == name)
    }

    /// Runs the post-init pass on every registered module.
    pub fn post_init_all(&mut self) {
        for module in &mut self.modules {
            module.post_init();
        }
    }

    pub fn collect(&mut self, name: &str, mode: CollectMode) -> Result<(), CollectError> {
        let Context {
            handle, modules, ..
        } = self;
        let module = modules
            .iter_mut()
            .find(|m| m.name() == name)
            .ok_or_else(|| CollectError::UnknownModule(name.to_string()))?;
        module.collect(handle, mode)
    }

    /// Collects every module in registration order. A failing module does not
    /// stop the walk; its error is returned alongside the others.
    pub fn collect_all(&mut self, mode: CollectMode) -> Vec<CollectError> {
        let Context {
            handle, modules, ..
        } = self;
        let mut errors = Vec::new();
        for module in modules.iter_mut() {
            if let Err(e) = module.collect(handle, mode) {
                warn!(module = module.name(), error = %e, "Collection stopped early");
                errors.push(e);
            }
        }
        errors
    }

    pub fn print_all(&self) {
        for module in &self.modules {
            module.print(&self.handle);
        }
    }

    pub fn clear_all(&mut self) {
        for module in &mut self.modules {
            module.clear();
        }
    }

    /// Self-tests one module. `None` if no such module is registered.
    pub fn self_test(&mut self, name: &str) -> Option<bool> {
        let Context {
            handle,
            modules,
            self_test,
        } = self;
        let module = modules.iter_mut().find(|m| m.name() == name)?;
        Some(module.test(handle, self_test))
    }

    /// Self-tests every module. True only if all of them pass.
    pub fn self_test_all(&mut self) -> bool {
        let Context {
            handle,
            modules,
            self_test,
        } = self;
        let mut pass = true;
        for module in modules.iter_mut() {
            if !module.test(handle, self_test) {
                pass = false;
            }
        }
        pass
    }

    pub fn report(&self) -> ContextReport {
        ContextReport {
            error_threshold: self.handle.error_threshold(),
            modules: self.modules.iter().map(Module::report).collect(),
        }
    }
}
