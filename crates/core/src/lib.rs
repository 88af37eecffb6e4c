// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod context;
pub mod field;
pub mod iofic;
pub mod module;
pub mod peripherals;

pub use context::{Context, ContextReport, ErrorEvent, Handle};
pub use field::{CollectMode, CustomField, Field, FieldBehavior, FieldEnv, FieldTemplate, Severity};
pub use iofic::{ControlFlags, Group, Iofic, IoficRef, MAX_CONTROLLERS};
pub use module::{Capabilities, IoficOps, Module, ModuleIdent, ModuleOps, ModuleParams};
pub use self_test::SelfTestConfig;

/// Contract violations detected while constructing or registering a module.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModuleInitError {
    #[error("module name '{0}' exceeds {max} bytes", max = module::MODULE_NAME_MAX)]
    NameTooLong(String),
    #[error("module '{module}' binds {count} interrupt controllers, at most {max} supported")]
    TooManyControllers {
        module: String,
        count: usize,
        max: usize,
    },
    #[error("module '{module}': field {field} uses bit {bit}, groups are 32 bits wide")]
    InvalidBit { module: String, field: u32, bit: u8 },
    #[error("module '{module}': field {field} references controller {iofic_id}, only {controllers} bound")]
    ControllerOutOfRange {
        module: String,
        field: u32,
        iofic_id: usize,
        controllers: usize,
    },
    #[error("module '{module}': interrupt-mode field {field} has no controller to bind to")]
    UnboundInterruptField { module: String, field: u32 },
    #[error("module '{0}' is already registered")]
    DuplicateModule(String),
}

/// Stops the group scan of the current collection call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CollectError {
    #[error("collection aborted for module '{module}': {reason}")]
    Aborted { module: String, reason: String },
    #[error("no module named '{0}'")]
    UnknownModule(String),
}
