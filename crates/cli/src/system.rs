// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context as _};
use errwatch_config::{Severity, SystemDescriptor};
use errwatch_core::peripherals::iofic::SimIofic;
use errwatch_core::{Context, ErrorEvent, Handle, Iofic, IoficRef, ModuleParams};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A registered context together with the simulated controllers behind it.
pub struct SimulatedSystem {
    pub descriptor: SystemDescriptor,
    pub context: Context,
    controllers: HashMap<String, Vec<Arc<SimIofic>>>,
}

fn log_event(ev: &ErrorEvent<'_>) {
    match ev.severity {
        Severity::Uncorrectable => warn!(
            module = ev.module,
            field = ev.field_name,
            counter = ev.counter,
            "Uncorrectable error"
        ),
        Severity::Correctable => info!(
            module = ev.module,
            field = ev.field_name,
            counter = ev.counter,
            "Correctable error"
        ),
    }
}

/// Parses `MODULE:FIELD_ID`. The module name may itself contain colons.
pub fn parse_injection(s: &str) -> Result<(String, u32), String> {
    let (module, field) = s
        .rsplit_once(':')
        .ok_or_else(|| format!("Invalid injection '{}', expected MODULE:FIELD_ID", s))?;
    let id = field
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("Invalid field id in '{}': {}", s, e))?;
    Ok((module.to_string(), id))
}

impl SimulatedSystem {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        info!("Loading system descriptor: {:?}", path);
        let descriptor = SystemDescriptor::from_file(path)?;
        Self::build(descriptor)
    }

    /// Instantiates one simulated controller per declared controller, then
    /// registers, post-inits and enables every module.
    pub fn build(descriptor: SystemDescriptor) -> anyhow::Result<Self> {
        let handle = Handle::default()
            .with_threshold(descriptor.error_threshold)
            .with_error_callback(log_event)
            .with_print_sink(|line: &str| println!("{}", line));
        let mut context = Context::new(handle).with_self_test(descriptor.self_test.into());
        let mut controllers = HashMap::new();

        for desc in &descriptor.modules {
            let sims: Vec<Arc<SimIofic>> = (0..desc.controllers)
                .map(|i| Arc::new(SimIofic::new(format!("{}.ic{}", desc.name, i))))
                .collect();
            let refs: Vec<IoficRef> = sims.iter().map(|s| s.clone() as IoficRef).collect();

            context
                .init_module(ModuleParams::from_descriptor(desc, refs))
                .with_context(|| format!("Failed to register module '{}'", desc.name))?;
            if let Some(module) = context.module_mut(&desc.name) {
                module.set_enabled(desc.enabled);
            }
            controllers.insert(desc.name.clone(), sims);
        }

        context.post_init_all();
        for module in context.modules() {
            module.unmask_interrupts();
        }

        Ok(Self {
            descriptor,
            context,
            controllers,
        })
    }

    /// Sets the cause bit of `field_id` on its simulated controller.
    pub fn inject(&self, module: &str, field_id: u32) -> anyhow::Result<()> {
        let desc = self
            .descriptor
            .modules
            .iter()
            .find(|m| m.name == module)
            .ok_or_else(|| anyhow!("Unknown module '{}'", module))?;
        let field = desc
            .fields
            .iter()
            .find(|f| f.id == field_id)
            .ok_or_else(|| anyhow!("Module '{}' has no field {}", module, field_id))?;
        let Some(ic) = self
            .controllers
            .get(module)
            .and_then(|sims| sims.get(field.iofic_id))
        else {
            bail!(
                "Field {} of '{}' is not bound to a controller",
                field_id,
                module
            );
        };

        info!(module, field = %field.name, group = %field.group, bit = field.bit, "Injecting fault");
        ic.set_cause(field.group, field.bit_mask());
        Ok(())
    }

    pub fn controller_snapshot(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for (name, sims) in &self.controllers {
            let snaps: Vec<serde_json::Value> = sims.iter().map(|s| s.snapshot()).collect();
            out.insert(name.clone(), serde_json::Value::Array(snaps));
        }
        serde_json::Value::Object(out)
    }
}
