//! Module manifest parsing and validation
//!
//! Parses `module.toml` (or `module.json`) manifests into module records with
//! their declared facets populated. Manifests describe only the declared side;
//! resolved facets are written by the resolver.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::module::flags::StateFlags;
use crate::module::record::{ModuleId, ModuleRecord};
use crate::module::registry::specs::{
    ExportSpec, FragmentAttachment, GenericCapability, GenericRequirement, HostSpec, ImportSpec,
    ModuleRequirement, NativeCodeSpec,
};
use crate::module::registry::version::Version;
use crate::module::traits::ModuleError;
use crate::utils::validation::{ensure_fmt, ensure_not_empty};

/// Module manifest (module.toml structure)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Module name
    pub name: String,
    /// Module version, `major.minor.micro[.qualifier]`
    #[serde(default)]
    pub version: Version,
    /// Where the module content lives
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub platform_filter: Option<String>,
    #[serde(default)]
    pub execution_environments: Vec<String>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub fragment_attachment: FragmentAttachment,
    /// Present only for fragments
    #[serde(default)]
    pub host: Option<HostSpec>,
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    #[serde(default)]
    pub exports: Vec<ExportSpec>,
    /// Requirements on other modules as a whole
    #[serde(default)]
    pub requires: Vec<ModuleRequirement>,
    #[serde(default)]
    pub requirements: Vec<GenericRequirement>,
    #[serde(default)]
    pub capabilities: Vec<GenericCapability>,
    #[serde(default)]
    pub native_code: Option<NativeCodeSpec>,
}

impl ModuleManifest {
    /// Load manifest from file; `.json` files are parsed as JSON, anything else as TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ModuleError::InvalidManifest(format!(
                "Failed to read manifest file {}: {}",
                path.display(),
                e
            ))
        })?;

        let manifest = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str::<ModuleManifest>(&contents)?
        } else {
            Self::parse_toml(&contents)?
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse and validate a TOML manifest
    pub fn from_toml_str(contents: &str) -> Result<Self, ModuleError> {
        let manifest = Self::parse_toml(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn parse_toml(contents: &str) -> Result<Self, ModuleError> {
        toml::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })
    }

    /// Validate required fields
    pub fn validate(&self) -> Result<(), ModuleError> {
        let check = || -> Result<(), String> {
            ensure_fmt(!self.name.trim().is_empty(), || {
                "Module name cannot be empty".to_string()
            })?;
            for import in &self.imports {
                ensure_fmt(!import.name.is_empty(), || {
                    format!("Module {} declares an import without a name", self.name)
                })?;
            }
            for export in &self.exports {
                ensure_fmt(!export.name.is_empty(), || {
                    format!("Module {} declares an export without a name", self.name)
                })?;
            }
            for requirement in &self.requirements {
                ensure_fmt(!requirement.namespace.is_empty(), || {
                    format!("Module {} declares a requirement without a namespace", self.name)
                })?;
            }
            for capability in &self.capabilities {
                ensure_fmt(!capability.namespace.is_empty(), || {
                    format!("Module {} declares a capability without a namespace", self.name)
                })?;
            }
            if let Some(native) = &self.native_code {
                for clause in &native.possible_suppliers {
                    ensure_not_empty(&clause.paths, "native_code paths")?;
                }
            }
            if let Some(host) = &self.host {
                ensure_fmt(!host.name.is_empty(), || {
                    format!("Fragment {} names an empty host", self.name)
                })?;
            }
            Ok(())
        };
        check().map_err(ModuleError::InvalidManifest)
    }

    /// State bits implied by the manifest's directives
    pub fn state_flags(&self) -> StateFlags {
        let mut flags = StateFlags::default();
        flags.set(StateFlags::SINGLETON, self.singleton);
        match self.fragment_attachment {
            FragmentAttachment::Always => {}
            FragmentAttachment::ResolveTime => flags.remove(StateFlags::DYNAMIC_FRAGMENTS),
            FragmentAttachment::Never => {
                flags.remove(StateFlags::ATTACH_FRAGMENTS | StateFlags::DYNAMIC_FRAGMENTS)
            }
        }
        flags
    }

    /// Build a fully loaded module record with the declared facets populated
    pub fn into_record(self, id: ModuleId) -> Result<Arc<ModuleRecord>, ModuleError> {
        let record = ModuleRecord::new(id, self.name.clone(), self.version.clone());

        let flags = self.state_flags();
        for flag in [
            StateFlags::SINGLETON,
            StateFlags::ATTACH_FRAGMENTS,
            StateFlags::DYNAMIC_FRAGMENTS,
        ] {
            record.set_state_flag(flag, flags.contains(flag));
        }

        record.set_host(self.host);
        record.set_location(self.location)?;
        record.set_platform_filter(self.platform_filter)?;
        record.set_execution_environments(self.execution_environments)?;
        record.set_imports(self.imports)?;
        record.set_exports(self.exports)?;
        record.set_required_modules(self.requires)?;
        record.set_generic_requirements(self.requirements)?;
        record.set_generic_capabilities(self.capabilities)?;
        record.set_native_code(self.native_code)?;

        debug!("Built module {} from manifest", record);
        Ok(record)
    }
}
