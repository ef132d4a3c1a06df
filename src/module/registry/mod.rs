//! Module registry values
//!
//! Versions, the specification values loaders supply, and manifest parsing.

pub mod manifest;
pub mod specs;
pub mod version;

pub use manifest::ModuleManifest;
pub use specs::{
    Attributes, ExportSpec, FragmentAttachment, GenericCapability, GenericRequirement, HostSpec,
    ImportSpec, ModuleCapability, ModuleRequirement, NativeCodeDescription, NativeCodeSpec,
    Resolution, WiredCapability, MODULE_NAMESPACE, PACKAGE_NAMESPACE,
};
pub use version::{Version, VersionRange};
