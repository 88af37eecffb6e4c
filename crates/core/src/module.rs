// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::context::{FieldReport, Handle, ModuleReport};
use crate::field::{CollectMode, Field, FieldBehavior, FieldEnv, FieldTemplate};
use crate::iofic::{Group, IoficRef, MAX_CONTROLLERS};
use crate::self_test::{self, SelfTestConfig};
use crate::{CollectError, ModuleInitError};
use errwatch_config::{GroupMasks, ModuleDescriptor, PrimaryModule, SecondaryModule};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Longest accepted module name, in bytes.
pub const MODULE_NAME_MAX: usize = 32;

/// Classification of the hardware unit instance a module monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleIdent {
    pub primary: PrimaryModule,
    pub primary_index: u32,
    pub secondary: SecondaryModule,
    pub secondary_index: u32,
}

impl ModuleIdent {
    pub fn new(primary: PrimaryModule, primary_index: u32) -> Self {
        Self {
            primary,
            primary_index,
            secondary: SecondaryModule::None,
            secondary_index: 0,
        }
    }

    pub fn with_secondary(mut self, secondary: SecondaryModule, index: u32) -> Self {
        self.secondary = secondary;
        self.secondary_index = index;
        self
    }
}

impl fmt::Display for ModuleIdent {
    /// `ETH(0)-MAC`, or `ETH(0)-EC(1)` when the secondary index is non-zero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.primary, self.primary_index)?;
        match (self.secondary, self.secondary_index) {
            (SecondaryModule::None, _) => Ok(()),
            (s, 0) => write!(f, "-{}", s),
            (s, i) => write!(f, "-{}({})", s, i),
        }
    }
}

/// Which bits exist on the running chip, per controller and group.
///
/// Controllers without an entry are unrestricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    masks: [Option<GroupMasks>; MAX_CONTROLLERS],
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves capabilities once from a feature-detection query.
    pub fn detect(mut query: impl FnMut(usize) -> Option<GroupMasks>) -> Self {
        let mut caps = Self::new();
        for (id, slot) in caps.masks.iter_mut().enumerate() {
            *slot = query(id);
        }
        caps
    }

    pub fn with(mut self, iofic_id: usize, masks: GroupMasks) -> Self {
        if let Some(slot) = self.masks.get_mut(iofic_id) {
            *slot = Some(masks);
        }
        self
    }

    pub fn masks(&self, iofic_id: usize) -> Option<GroupMasks> {
        self.masks.get(iofic_id).copied().flatten()
    }

    pub fn is_present(&self, iofic_id: usize, group: Group, bit: u32) -> bool {
        self.masks(iofic_id)
            .map_or(true, |m| m.get(group) & bit != 0)
    }
}

/// The four lifecycle operations of a module. IP blocks override what they
/// need; the defaults implement generic IOFIC-backed behaviour.
pub trait ModuleOps: fmt::Debug + Send + Sync {
    fn collect(
        &self,
        module: &mut Module,
        handle: &Handle,
        mode: CollectMode,
    ) -> Result<(), CollectError> {
        module.collect_groups(handle, mode);
        Ok(())
    }

    fn print(&self, module: &Module, handle: &Handle) {
        module.print_fields(handle);
    }

    fn clear(&self, module: &mut Module) {
        module.clear_counters();
    }

    fn test(&self, module: &mut Module, handle: &Handle, config: &SelfTestConfig) -> bool {
        self_test::run(module, handle, config)
    }
}

/// Default lifecycle: scan every bound controller group.
#[derive(Debug, Default, Clone, Copy)]
pub struct IoficOps;

impl ModuleOps for IoficOps {}

/// Registration parameters handed over by an IP-specific initializer.
pub struct ModuleParams {
    pub name: String,
    pub ident: ModuleIdent,
    pub controllers: Vec<IoficRef>,
    pub template: Vec<FieldTemplate>,
    /// Overrides the collect mode of every field.
    pub collect_mode: Option<CollectMode>,
    pub error_threshold: Option<u32>,
    pub capabilities: Option<Capabilities>,
    pub private_data: Option<Box<dyn Any + Send + Sync>>,
    pub ops: Arc<dyn ModuleOps>,
}

impl ModuleParams {
    pub fn new(ident: ModuleIdent) -> Self {
        Self {
            name: ident.to_string(),
            ident,
            controllers: Vec::new(),
            template: Vec::new(),
            collect_mode: None,
            error_threshold: None,
            capabilities: None,
            private_data: None,
            ops: Arc::new(IoficOps),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn controllers(mut self, controllers: Vec<IoficRef>) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn fields(mut self, template: &[FieldTemplate]) -> Self {
        self.template = template.to_vec();
        self
    }

    pub fn collect_mode(mut self, mode: CollectMode) -> Self {
        self.collect_mode = Some(mode);
        self
    }

    pub fn error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = Some(threshold);
        self
    }

    pub fn capabilities(mut self, caps: Capabilities) -> Self {
        self.capabilities = Some(caps);
        self
    }

    pub fn private_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.private_data = Some(Box::new(data));
        self
    }

    pub fn ops(mut self, ops: Arc<dyn ModuleOps>) -> Self {
        self.ops = ops;
        self
    }

    /// Registration parameters for a declaratively described module.
    pub fn from_descriptor(desc: &ModuleDescriptor, controllers: Vec<IoficRef>) -> Self {
        let ident = ModuleIdent::new(desc.primary, desc.primary_index)
            .with_secondary(desc.secondary, desc.secondary_index);
        let template: Vec<FieldTemplate> = desc.fields.iter().map(FieldTemplate::from).collect();

        let mut params = Self::new(ident).name(desc.name.clone()).controllers(controllers);
        params.template = template;
        params.collect_mode = desc.collect_mode;
        params.error_threshold = desc.error_threshold;
        if !desc.capabilities.is_empty() {
            params.capabilities = Some(Capabilities::detect(|id| desc.capabilities_for(id)));
        }
        params
    }
}

/// A named set of fields belonging to one hardware unit instance.
pub struct Module {
    name: String,
    ident: ModuleIdent,
    controllers: Vec<IoficRef>,
    fields: Vec<Field>,
    private_data: Option<Box<dyn Any + Send + Sync>>,
    ops: Arc<dyn ModuleOps>,
    enabled: bool,
    has_polling_fields: bool,
    error_threshold: Option<u32>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("ident", &self.ident)
            .field("controllers", &self.controllers.len())
            .field("fields", &self.fields)
            .field("ops", &self.ops)
            .field("enabled", &self.enabled)
            .field("has_polling_fields", &self.has_polling_fields)
            .field("error_threshold", &self.error_threshold)
            .finish_non_exhaustive()
    }
}

impl Module {
    /// Validates `params` and clones the template into a fresh field array.
    pub fn new(params: ModuleParams) -> Result<Self, ModuleInitError> {
        let ModuleParams {
            name,
            ident,
            controllers,
            template,
            collect_mode,
            error_threshold,
            capabilities,
            private_data,
            ops,
        } = params;

        if name.len() > MODULE_NAME_MAX {
            return Err(ModuleInitError::NameTooLong(name));
        }
        if controllers.len() > MAX_CONTROLLERS {
            return Err(ModuleInitError::TooManyControllers {
                module: name,
                count: controllers.len(),
                max: MAX_CONTROLLERS,
            });
        }

        // A per-module `Default` is no override at all.
        let mode_override = collect_mode.filter(|m| *m != CollectMode::Default);

        let mut fields = Vec::with_capacity(template.len());
        for row in &template {
            if row.bit > 31 {
                return Err(ModuleInitError::InvalidBit {
                    module: name,
                    field: row.id,
                    bit: row.bit,
                });
            }
            if !controllers.is_empty() && row.iofic_id >= controllers.len() {
                return Err(ModuleInitError::ControllerOutOfRange {
                    module: name,
                    field: row.id,
                    iofic_id: row.iofic_id,
                    controllers: controllers.len(),
                });
            }

            let mut field = Field::from_template(row);
            field.collect_mode = match (mode_override, field.collect_mode) {
                (Some(mode), _) => mode,
                (None, CollectMode::Default) => CollectMode::Interrupt,
                (None, mode) => mode,
            };

            if field.collect_mode == CollectMode::Interrupt
                && field.is_iofic()
                && controllers.is_empty()
            {
                return Err(ModuleInitError::UnboundInterruptField {
                    module: name,
                    field: row.id,
                });
            }

            // Custom and empty fields carry no cause bit to look up.
            if let (Some(caps), true) = (&capabilities, field.is_iofic()) {
                field.valid = caps.is_present(field.iofic_id, field.group, field.bit);
            }
            fields.push(field);
        }

        let mut module = Self {
            name,
            ident,
            controllers,
            fields,
            private_data,
            ops,
            enabled: true,
            has_polling_fields: false,
            error_threshold,
        };
        module.clear();
        debug!(module = %module.name, fields = module.fields.len(), "Module initialized");
        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ident(&self) -> ModuleIdent {
        self.ident
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, id: u32) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_mut(&mut self, id: u32) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.id == id)
    }

    pub fn controllers(&self) -> &[IoficRef] {
        &self.controllers
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A disabled module no-ops on collect and test, and prints as ignored.
    /// Counters are kept.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn has_polling_fields(&self) -> bool {
        self.has_polling_fields
    }

    pub fn error_threshold(&self) -> Option<u32> {
        self.error_threshold
    }

    pub fn set_error_threshold(&mut self, threshold: Option<u32>) {
        self.error_threshold = threshold;
    }

    /// Module threshold, falling back to the handle's global one.
    pub fn effective_threshold(&self, handle: &Handle) -> Option<u32> {
        self.error_threshold.or(handle.error_threshold())
    }

    pub fn private_data<T: Any>(&self) -> Option<&T> {
        self.private_data
            .as_deref()
            .and_then(|p| p.downcast_ref::<T>())
    }

    /// Masks every polling-mode cause bit that is still unmasked, so polled
    /// conditions can never raise an interrupt.
    pub fn post_init(&mut self) {
        for (id, ic) in self.controllers.iter().enumerate() {
            let mut cached: [Option<u32>; errwatch_config::GROUP_COUNT] = Default::default();
            for field in self
                .fields
                .iter()
                .filter(|f| f.iofic_id == id && f.is_iofic())
                .filter(|f| f.collect_mode == CollectMode::Polling)
            {
                let mask = cached[field.group.index()].get_or_insert_with(|| ic.read_mask(field.group));
                if *mask & field.bit == 0 {
                    ic.mask(field.group, field.bit);
                    *mask |= field.bit;
                    info!(
                        module = %self.name,
                        field = %field.name,
                        group = %field.group,
                        "Masked polling field interrupt"
                    );
                }
            }
        }

        self.has_polling_fields = self
            .fields
            .iter()
            .any(|f| f.collect_mode == CollectMode::Polling);
    }

    /// Collects one controller group: the cause register is read once and that
    /// snapshot is dispatched to every matching valid field.
    pub fn iofic_collect(
        &mut self,
        handle: &Handle,
        mode: CollectMode,
        iofic_id: usize,
        group: Group,
    ) {
        if mode == CollectMode::Polling && !self.has_polling_fields {
            return;
        }
        let Some(ic) = self.controllers.get(iofic_id) else {
            return;
        };

        let cause = ic.read_cause(group);
        if cause == 0 {
            return;
        }
        let mask = ic.read_mask(group);

        let threshold = self.effective_threshold(handle);
        let Module {
            name,
            controllers,
            fields,
            private_data,
            ..
        } = self;
        let env = FieldEnv {
            module: name,
            controllers,
            threshold,
            handle,
            private_data: private_data.as_deref(),
        };

        for field in fields.iter_mut().filter(|f| {
            f.valid && f.iofic_id == iofic_id && f.group == group && f.matches_mode(mode)
        }) {
            if field.collect_mode == CollectMode::Interrupt && mask & field.bit != 0 {
                continue;
            }
            field.collect(&env, cause);
        }
    }

    /// Default collection: every group of every bound controller, then
    /// controller-less custom fields on polling passes.
    pub fn collect_groups(&mut self, handle: &Handle, mode: CollectMode) {
        for id in 0..self.controllers.len() {
            for group in Group::ALL {
                self.iofic_collect(handle, mode, id, group);
            }
        }

        if mode == CollectMode::Interrupt || !self.controllers.is_empty() {
            return;
        }

        let threshold = self.effective_threshold(handle);
        let Module {
            name,
            controllers,
            fields,
            private_data,
            ..
        } = self;
        let env = FieldEnv {
            module: name,
            controllers,
            threshold,
            handle,
            private_data: private_data.as_deref(),
        };
        for field in fields.iter_mut().filter(|f| {
            f.valid
                && f.collect_mode == CollectMode::Polling
                && matches!(f.behavior, FieldBehavior::Custom(_))
        }) {
            field.collect(&env, 0);
        }
    }

    /// Union of the bits of valid interrupt-mode fields bound to `(iofic_id, group)`.
    pub fn group_mask_get(&self, iofic_id: usize, group: Group) -> u32 {
        self.fields
            .iter()
            .filter(|f| {
                f.valid
                    && f.collect_mode == CollectMode::Interrupt
                    && f.iofic_id == iofic_id
                    && f.group == group
            })
            .fold(0, |acc, f| acc | f.bit)
    }

    /// Unmasks exactly the interrupt-mode bits this module owns.
    pub fn unmask_interrupts(&self) {
        for (id, ic) in self.controllers.iter().enumerate() {
            for group in Group::ALL {
                let bits = self.group_mask_get(id, group);
                if bits != 0 {
                    ic.unmask(group, bits);
                }
            }
        }
    }

    /// Invalidates cause-bit fields of `iofic_id` whose bit is missing from the
    /// runtime capability masks.
    pub fn update_valid_fields(&mut self, iofic_id: usize, masks: GroupMasks) {
        for field in self
            .fields
            .iter_mut()
            .filter(|f| f.is_iofic() && f.iofic_id == iofic_id)
        {
            if masks.get(field.group) & field.bit == 0 {
                field.valid = false;
            }
        }
    }

    pub fn collect(&mut self, handle: &Handle, mode: CollectMode) -> Result<(), CollectError> {
        if !self.enabled {
            return Ok(());
        }
        let ops = Arc::clone(&self.ops);
        ops.collect(self, handle, mode)
    }

    pub fn print(&self, handle: &Handle) {
        self.ops.print(self, handle);
    }

    pub fn clear(&mut self) {
        let ops = Arc::clone(&self.ops);
        ops.clear(self);
    }

    pub fn test(&mut self, handle: &Handle, config: &SelfTestConfig) -> bool {
        if !self.enabled {
            return true;
        }
        let ops = Arc::clone(&self.ops);
        ops.test(self, handle, config)
    }

    /// Default print: the module name, then one line per field.
    pub fn print_fields(&self, handle: &Handle) {
        handle.print(&self.name);
        if !self.enabled {
            handle.print("Ignored");
            return;
        }
        for field in &self.fields {
            field.print(&self.name, handle, false);
        }
    }

    /// Zeroes every counter; validity and hardware state are untouched.
    pub fn clear_counters(&mut self) {
        for field in &mut self.fields {
            field.counter = 0;
        }
    }

    pub fn report(&self) -> ModuleReport {
        ModuleReport {
            name: self.name.clone(),
            enabled: self.enabled,
            fields: self
                .fields
                .iter()
                .map(|f| FieldReport {
                    id: f.id,
                    name: f.name.to_string(),
                    counter: f.counter,
                    valid: f.valid,
                    severity: f.severity,
                    collect_mode: f.collect_mode,
                })
                .collect(),
        }
    }
}
