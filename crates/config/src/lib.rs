// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default schema version for YAML descriptors
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_true() -> bool {
    true
}

/// Number of cause/mask register groups per interrupt controller.
pub const GROUP_COUNT: usize = 4;

/// A 32-bit register group of an interrupt controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    #[serde(alias = "A")]
    A,
    #[serde(alias = "B")]
    B,
    #[serde(alias = "C")]
    C,
    #[serde(alias = "D")]
    D,
}

impl Group {
    pub const ALL: [Group; GROUP_COUNT] = [Group::A, Group::B, Group::C, Group::D];

    pub fn index(self) -> usize {
        match self {
            Group::A => 0,
            Group::B => 1,
            Group::C => 2,
            Group::D => 3,
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = match self {
            Group::A => 'A',
            Group::B => 'B',
            Group::C => 'C',
            Group::D => 'D',
        };
        write!(f, "{}", c)
    }
}

/// How a field is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectMode {
    #[default]
    #[serde(alias = "irq")]
    Interrupt,
    #[serde(alias = "poll")]
    Polling,
    /// Matches either mode when used as a collection filter.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "ce")]
    Correctable,
    #[default]
    #[serde(alias = "ue")]
    Uncorrectable,
}

/// Primary classification of the hardware unit a module monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryModule {
    #[serde(alias = "ethernet")]
    Eth,
    Pcie,
    #[serde(alias = "sys_fabric")]
    SysFabric,
    Cache,
    Ddr,
    Serdes,
    Gpio,
}

impl std::fmt::Display for PrimaryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PrimaryModule::Eth => "ETH",
            PrimaryModule::Pcie => "PCIE",
            PrimaryModule::SysFabric => "SYS_FABRIC",
            PrimaryModule::Cache => "CACHE",
            PrimaryModule::Ddr => "DDR",
            PrimaryModule::Serdes => "SERDES",
            PrimaryModule::Gpio => "GPIO",
        };
        f.write_str(s)
    }
}

/// Secondary classification (sub-unit) of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryModule {
    #[default]
    None,
    Mac,
    Ec,
    Axi,
    App,
    L1,
    L2,
}

impl std::fmt::Display for SecondaryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SecondaryModule::None => "",
            SecondaryModule::Mac => "MAC",
            SecondaryModule::Ec => "EC",
            SecondaryModule::Axi => "AXI",
            SecondaryModule::App => "APP",
            SecondaryModule::L1 => "L1",
            SecondaryModule::L2 => "L2",
        };
        f.write_str(s)
    }
}

/// Field behaviours that can be expressed declaratively. IP-specific
/// collectors are attached in code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Iofic,
    Empty,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub iofic_id: usize,
    pub group: Group,
    pub bit: u8,
    #[serde(default)]
    pub collect_mode: CollectMode,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn bit_mask(&self) -> u32 {
        1u32 << (self.bit & 31)
    }
}

/// Per-group runtime capability masks of one controller.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct GroupMasks {
    #[serde(default)]
    pub a: u32,
    #[serde(default)]
    pub b: u32,
    #[serde(default)]
    pub c: u32,
    #[serde(default)]
    pub d: u32,
}

impl GroupMasks {
    pub const ALL: GroupMasks = GroupMasks {
        a: u32::MAX,
        b: u32::MAX,
        c: u32::MAX,
        d: u32::MAX,
    };

    pub fn get(&self, group: Group) -> u32 {
        match group {
            Group::A => self.a,
            Group::B => self.b,
            Group::C => self.c,
            Group::D => self.d,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub iofic_id: usize,
    pub groups: GroupMasks,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub primary: PrimaryModule,
    #[serde(default)]
    pub primary_index: u32,
    #[serde(default)]
    pub secondary: SecondaryModule,
    #[serde(default)]
    pub secondary_index: u32,
    /// Number of interrupt controllers bound to the module.
    #[serde(default)]
    pub controllers: usize,
    /// Overrides the collect mode of every field when set.
    #[serde(default)]
    pub collect_mode: Option<CollectMode>,
    #[serde(default)]
    pub error_threshold: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDescriptor>,
}

fn default_runs() -> u32 {
    2
}

fn default_deadline_us() -> u64 {
    1000
}

fn default_poll_delay_every() -> u32 {
    100
}

fn default_poll_delay_us() -> u64 {
    1
}

/// Tuning of the self-test polling loop.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestSettings {
    #[serde(default = "default_runs")]
    pub runs: u32,
    #[serde(default = "default_deadline_us")]
    pub deadline_us: u64,
    #[serde(default = "default_poll_delay_every")]
    pub poll_delay_every: u32,
    #[serde(default = "default_poll_delay_us")]
    pub poll_delay_us: u64,
}

impl Default for SelfTestSettings {
    fn default() -> Self {
        Self {
            runs: default_runs(),
            deadline_us: default_deadline_us(),
            poll_delay_every: default_poll_delay_every(),
            poll_delay_us: default_poll_delay_us(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SystemDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    /// Global auto-mask threshold; modules may override it.
    #[serde(default)]
    pub error_threshold: Option<u32>,
    #[serde(default)]
    pub self_test: SelfTestSettings,
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("module '{module}': field {field} uses bit {bit}, groups are 32 bits wide")]
    BitOutOfRange { module: String, field: u32, bit: u8 },
    #[error("module '{module}': duplicate field id {field}")]
    DuplicateField { module: String, field: u32 },
    #[error("duplicate module name '{0}'")]
    DuplicateModule(String),
    #[error("module '{module}': field {field} references controller {iofic_id} but only {controllers} declared")]
    ControllerOutOfRange {
        module: String,
        field: u32,
        iofic_id: usize,
        controllers: usize,
    },
    #[error("unsupported schema version '{0}'")]
    UnsupportedSchema(String),
}

impl SystemDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read system descriptor {:?}", path))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid system descriptor {:?}", path))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let desc: SystemDescriptor =
            serde_yaml::from_str(content).context("Failed to parse System Descriptor YAML")?;
        desc.validate()?;
        Ok(desc)
    }

    /// Checks cross-field invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.schema_version.starts_with("1.") {
            return Err(ConfigError::UnsupportedSchema(self.schema_version.clone()));
        }

        let mut names = HashSet::new();
        for module in &self.modules {
            if !names.insert(module.name.as_str()) {
                return Err(ConfigError::DuplicateModule(module.name.clone()));
            }
            module.validate()?;
        }
        Ok(())
    }
}

impl ModuleDescriptor {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for field in &self.fields {
            if field.bit > 31 {
                return Err(ConfigError::BitOutOfRange {
                    module: self.name.clone(),
                    field: field.id,
                    bit: field.bit,
                });
            }
            if !ids.insert(field.id) {
                return Err(ConfigError::DuplicateField {
                    module: self.name.clone(),
                    field: field.id,
                });
            }
            if self.controllers > 0 && field.iofic_id >= self.controllers {
                return Err(ConfigError::ControllerOutOfRange {
                    module: self.name.clone(),
                    field: field.id,
                    iofic_id: field.iofic_id,
                    controllers: self.controllers,
                });
            }
        }
        Ok(())
    }

    /// Capability masks for one controller, if the descriptor restricts it.
    pub fn capabilities_for(&self, iofic_id: usize) -> Option<GroupMasks> {
        self.capabilities
            .iter()
            .find(|c| c.iofic_id == iofic_id)
            .map(|c| c.groups)
    }
}
