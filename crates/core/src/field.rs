// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::context::{ErrorEvent, Handle};
use crate::iofic::{Group, IoficRef};
use std::any::Any;
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::warn;

pub use errwatch_config::{CollectMode, Severity};

/// IP-specific collection logic for fields that are not plain cause bits,
/// e.g. DDR ECC syndrome registers.
pub trait CustomField: Debug + Send + Sync {
    /// Called with the cause snapshot of the field's group, or zero when the
    /// field is polled without a controller.
    fn collect(&self, field: &mut Field, env: &FieldEnv<'_>, cause: u32);

    fn mask(&self, _field: &Field, _env: &FieldEnv<'_>) {}

    /// Report line of a valid field, without the module prefix.
    fn render(&self, field: &Field) -> String {
        format!("{}: {}", field.name, field.counter)
    }
}

/// Closed set of field behaviours.
#[derive(Debug, Clone, Default)]
pub enum FieldBehavior {
    /// Generic cause-bit read, clear and mask.
    #[default]
    Iofic,
    Custom(Arc<dyn CustomField>),
    /// Software-detected condition without an interrupt line.
    Empty,
}

impl From<errwatch_config::FieldKind> for FieldBehavior {
    fn from(kind: errwatch_config::FieldKind) -> Self {
        match kind {
            errwatch_config::FieldKind::Iofic => FieldBehavior::Iofic,
            errwatch_config::FieldKind::Empty => FieldBehavior::Empty,
        }
    }
}

/// Immutable descriptor row a module's fields are cloned from.
#[derive(Debug, Clone)]
pub struct FieldTemplate {
    pub id: u32,
    pub name: Cow<'static, str>,
    pub iofic_id: usize,
    pub group: Group,
    /// Bit index within the group register.
    pub bit: u8,
    pub collect_mode: CollectMode,
    pub severity: Severity,
    pub behavior: FieldBehavior,
}

impl FieldTemplate {
    pub fn iofic(
        id: u32,
        name: impl Into<Cow<'static, str>>,
        iofic_id: usize,
        group: Group,
        bit: u8,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            iofic_id,
            group,
            bit,
            collect_mode: CollectMode::Interrupt,
            severity: Severity::Uncorrectable,
            behavior: FieldBehavior::Iofic,
        }
    }

    pub fn empty(id: u32, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            behavior: FieldBehavior::Empty,
            collect_mode: CollectMode::Polling,
            ..Self::iofic(id, name, 0, Group::A, 0)
        }
    }

    pub fn custom(
        id: u32,
        name: impl Into<Cow<'static, str>>,
        collector: Arc<dyn CustomField>,
    ) -> Self {
        Self {
            behavior: FieldBehavior::Custom(collector),
            collect_mode: CollectMode::Polling,
            ..Self::iofic(id, name, 0, Group::A, 0)
        }
    }

    pub fn with_mode(mut self, mode: CollectMode) -> Self {
        self.collect_mode = mode;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_binding(mut self, iofic_id: usize, group: Group, bit: u8) -> Self {
        self.iofic_id = iofic_id;
        self.group = group;
        self.bit = bit;
        self
    }
}

impl From<&errwatch_config::FieldDescriptor> for FieldTemplate {
    fn from(desc: &errwatch_config::FieldDescriptor) -> Self {
        Self {
            id: desc.id,
            name: Cow::Owned(desc.name.clone()),
            iofic_id: desc.iofic_id,
            group: desc.group,
            bit: desc.bit,
            collect_mode: desc.collect_mode,
            severity: desc.severity,
            behavior: desc.kind.into(),
        }
    }
}

/// What a field sees of its owning module while collecting.
pub struct FieldEnv<'a> {
    pub module: &'a str,
    pub controllers: &'a [IoficRef],
    /// Effective auto-mask threshold.
    pub threshold: Option<u32>,
    pub handle: &'a Handle,
    pub private_data: Option<&'a (dyn Any + Send + Sync)>,
}

impl FieldEnv<'_> {
    pub fn private_data<T: Any>(&self) -> Option<&T> {
        self.private_data.and_then(|p| p.downcast_ref::<T>())
    }
}

/// One monitored hardware error condition.
#[derive(Debug, Clone)]
pub struct Field {
    pub id: u32,
    pub name: Cow<'static, str>,
    pub iofic_id: usize,
    pub group: Group,
    /// Single-bit mask within the group register.
    pub bit: u32,
    pub collect_mode: CollectMode,
    pub severity: Severity,
    pub counter: u32,
    pub valid: bool,
    pub behavior: FieldBehavior,
}

impl Field {
    pub(crate) fn from_template(template: &FieldTemplate) -> Self {
        Self {
            id: template.id,
            name: template.name.clone(),
            iofic_id: template.iofic_id,
            group: template.group,
            bit: 1u32 << (template.bit & 31),
            collect_mode: template.collect_mode,
            severity: template.severity,
            counter: 0,
            valid: true,
            behavior: template.behavior.clone(),
        }
    }

    pub fn is_iofic(&self) -> bool {
        matches!(self.behavior, FieldBehavior::Iofic)
    }

    /// Whether the field takes part in a collection pass of `mode`.
    pub fn matches_mode(&self, mode: CollectMode) -> bool {
        mode == CollectMode::Default || self.collect_mode == mode
    }

    /// Counts `count` events, notifies the handle and auto-masks the source
    /// once an interrupt-mode field reaches the threshold.
    pub fn record_error(&mut self, env: &FieldEnv<'_>, count: u32) {
        self.counter = self.counter.saturating_add(count);

        env.handle.notify(&ErrorEvent {
            module: env.module,
            field_id: self.id,
            field_name: &self.name,
            severity: self.severity,
            count,
            counter: self.counter,
        });

        if self.collect_mode != CollectMode::Interrupt {
            return;
        }
        if let Some(threshold) = env.threshold.filter(|t| *t > 0) {
            if self.counter >= threshold {
                warn!(
                    module = env.module,
                    field = %self.name,
                    counter = self.counter,
                    threshold,
                    "Error threshold reached, masking interrupt source"
                );
                self.mask(env);
            }
        }
    }

    pub fn collect(&mut self, env: &FieldEnv<'_>, cause: u32) {
        match &self.behavior {
            FieldBehavior::Iofic => self.iofic_collect(env, cause),
            FieldBehavior::Custom(custom) => {
                let custom = Arc::clone(custom);
                custom.collect(self, env, cause);
            }
            FieldBehavior::Empty => {}
        }
    }

    pub fn mask(&self, env: &FieldEnv<'_>) {
        match &self.behavior {
            FieldBehavior::Iofic => self.iofic_mask(env),
            FieldBehavior::Custom(custom) => custom.mask(self, env),
            FieldBehavior::Empty => {}
        }
    }

    fn iofic_collect(&mut self, env: &FieldEnv<'_>, cause: u32) {
        if cause & self.bit == 0 {
            return;
        }

        self.record_error(env, 1);

        let Some(ic) = env.controllers.get(self.iofic_id) else {
            return;
        };
        ic.clear_cause(self.group, self.bit);

        // The bit may re-assert in the same cycle it was cleared.
        if ic.read_cause(self.group) & self.bit != 0 {
            warn!(
                module = env.module,
                field = %self.name,
                group = %self.group,
                bit = self.bit,
                "Cause bit still set after clear"
            );
        }
    }

    fn iofic_mask(&self, env: &FieldEnv<'_>) {
        if let Some(ic) = env.controllers.get(self.iofic_id) {
            ic.mask(self.group, self.bit);
        }
    }

    pub fn print(&self, module: &str, handle: &Handle, with_header: bool) {
        let body = match (&self.behavior, self.valid) {
            (_, false) => format!("{}: Ignored", self.name),
            (FieldBehavior::Custom(custom), true) => custom.render(self),
            _ => format!("{}: {}", self.name, self.counter),
        };
        if with_header {
            handle.print(&format!("{}: {}", module, body));
        } else {
            handle.print(&body);
        }
    }
}
