//! Specification values supplied by loaders and consumed by the resolver
//!
//! A closed set of plain value types. Each type carries an optional
//! back-reference to its owning module, stamped by the record setter that
//! stores it; loaders leave it unset.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::module::record::ModuleId;
use crate::module::registry::version::{Version, VersionRange};

/// Namespace of the module-level capability every module provides
pub const MODULE_NAMESPACE: &str = "bllvm.wiring.module";
/// Namespace of exported and imported packages
pub const PACKAGE_NAMESPACE: &str = "bllvm.wiring.package";

pub const FRAGMENT_ATTACHMENT_DIRECTIVE: &str = "fragment-attachment";
pub const SINGLETON_DIRECTIVE: &str = "singleton";
pub const VERSION_ATTRIBUTE: &str = "module-version";

/// Matching attributes on imports, exports and capabilities
pub type Attributes = BTreeMap<String, String>;

/// When fragments may attach to a host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentAttachment {
    /// At resolve time and afterwards
    #[default]
    Always,
    /// Only while the host is being resolved
    ResolveTime,
    Never,
}

impl FragmentAttachment {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentAttachment::Always => "always",
            FragmentAttachment::ResolveTime => "resolve-time",
            FragmentAttachment::Never => "never",
        }
    }
}

/// `resolution` directive of an import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Static,
    Optional,
    /// Resolved on first use, after the module itself resolved
    Dynamic,
}

/// Package import declared by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSpec {
    pub name: String,
    #[serde(default)]
    pub version_range: VersionRange,
    /// Only accept the package from a module with this name
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub module_version_range: Option<VersionRange>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(skip)]
    pub owner: Option<ModuleId>,
}

impl ImportSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_range: VersionRange::default(),
            module_name: None,
            module_version_range: None,
            attributes: Attributes::new(),
            resolution: Resolution::Static,
            owner: None,
        }
    }

    pub fn with_version_range(mut self, range: VersionRange) -> Self {
        self.version_range = range;
        self
    }

    pub fn with_module(mut self, name: impl Into<String>, range: Option<VersionRange>) -> Self {
        self.module_name = Some(name.into());
        self.module_version_range = range;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.resolution == Resolution::Dynamic
    }

    /// Equality used to deduplicate dynamic imports; ignores owner and directives
    pub fn same_import(&self, other: &ImportSpec) -> bool {
        self.name == other.name
            && self.version_range == other.version_range
            && self.module_name == other.module_name
            && self.module_version_range == other.module_version_range
            && self.attributes == other.attributes
    }
}

/// Package exported by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSpec {
    pub name: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
    #[serde(skip)]
    pub exporter: Option<ModuleId>,
}

impl ExportSpec {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            attributes: Attributes::new(),
            directives: BTreeMap::new(),
            exporter: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Requirement on another module as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRequirement {
    pub name: String,
    #[serde(default)]
    pub version_range: VersionRange,
    #[serde(default)]
    pub optional: bool,
    /// Re-export the required module's packages
    #[serde(default)]
    pub reexport: bool,
    #[serde(skip)]
    pub owner: Option<ModuleId>,
}

impl ModuleRequirement {
    pub fn new(name: impl Into<String>, version_range: VersionRange) -> Self {
        Self {
            name: name.into(),
            version_range,
            optional: false,
            reexport: false,
            owner: None,
        }
    }
}

/// Requirement on a capability in an arbitrary namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericRequirement {
    pub namespace: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Filter expression, interpreted by the resolver
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub multiple: bool,
    #[serde(skip)]
    pub owner: Option<ModuleId>,
}

impl GenericRequirement {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: None,
            filter: None,
            optional: false,
            multiple: false,
            owner: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Capability in an arbitrary namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericCapability {
    pub namespace: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(skip)]
    pub supplier: Option<ModuleId>,
}

impl GenericCapability {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: Some(name.into()),
            version: Version::default(),
            attributes: Attributes::new(),
            supplier: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// One native code clause a module may be satisfied by
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCodeDescription {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub processors: Vec<String>,
    #[serde(default)]
    pub os_names: Vec<String>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(skip)]
    pub supplier: Option<ModuleId>,
}

/// Native code requirement of a module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCodeSpec {
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub possible_suppliers: Vec<NativeCodeDescription>,
    #[serde(skip)]
    pub owner: Option<ModuleId>,
}

/// Declares a module as a fragment of a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    #[serde(default)]
    pub version_range: VersionRange,
    /// Hosts the resolver attached this fragment to
    #[serde(skip)]
    pub hosts: Vec<ModuleId>,
}

impl HostSpec {
    pub fn new(name: impl Into<String>, version_range: VersionRange) -> Self {
        Self {
            name: name.into(),
            version_range,
            hosts: Vec::new(),
        }
    }
}

/// The module-level capability: "this module, by name and version"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCapability {
    pub module: ModuleId,
    pub name: Option<String>,
    pub version: Version,
}

impl fmt::Display for ModuleCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}_{}", name, self.version),
            None => write!(f, "[{}]", self.module),
        }
    }
}

/// A capability as seen through a wiring query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WiredCapability {
    Module(ModuleCapability),
    Package(ExportSpec),
    Generic(GenericCapability),
}

impl WiredCapability {
    pub fn namespace(&self) -> &str {
        match self {
            WiredCapability::Module(_) => MODULE_NAMESPACE,
            WiredCapability::Package(_) => PACKAGE_NAMESPACE,
            WiredCapability::Generic(capability) => &capability.namespace,
        }
    }

    /// Module providing the capability, when known
    pub fn supplier(&self) -> Option<ModuleId> {
        match self {
            WiredCapability::Module(capability) => Some(capability.module),
            WiredCapability::Package(export) => export.exporter,
            WiredCapability::Generic(capability) => capability.supplier,
        }
    }
}

/// `None` selects every namespace
pub(crate) fn namespace_matches(filter: Option<&str>, namespace: &str) -> bool {
    filter.map_or(true, |ns| ns == namespace)
}
