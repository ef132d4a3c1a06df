//! Capability wiring view
//!
//! A namespace-filterable projection over a resolved module's capabilities.
//! A module holds at most one live view; clearing RESOLVED invalidates it for
//! good and the next resolution gets a new instance. Views compare by
//! identity only.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::module::flags::StateFlags;
use crate::module::record::{ModuleRecord, UserObject};
use crate::module::registry::specs::{
    namespace_matches, WiredCapability, MODULE_NAMESPACE, PACKAGE_NAMESPACE,
};
use crate::module::traits::ModuleError;

pub struct WiringView {
    module: Weak<ModuleRecord>,
    valid: AtomicBool,
}

impl ModuleRecord {
    /// The installed wiring view, created on first request
    ///
    /// `None` while the module is unresolved, and always for fragments.
    pub fn wiring(&self) -> Option<Arc<WiringView>> {
        if self.is_fragment() {
            return None;
        }
        let mut inner = self.inner.lock();
        if !inner.flags.contains(StateFlags::RESOLVED) {
            return None;
        }
        let view = inner.wiring.get_or_insert_with(|| {
            debug!("Created wiring for module {}", self);
            Arc::new(WiringView {
                module: self.handle(),
                valid: AtomicBool::new(true),
            })
        });
        Some(Arc::clone(view))
    }

    /// Invalidate and drop the installed view, if any
    pub(crate) fn invalidate_wiring(&self) {
        if let Some(view) = self.inner.lock().wiring.take() {
            view.invalidate();
        }
    }

    fn installed_wiring_is(&self, view: &WiringView) -> bool {
        self.inner
            .lock()
            .wiring
            .as_ref()
            .is_some_and(|installed| std::ptr::eq(installed.as_ref(), view))
    }
}

impl WiringView {
    pub(crate) fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// The module this view was created for, while it is still alive
    pub fn module(&self) -> Option<Arc<ModuleRecord>> {
        self.module.upgrade()
    }

    /// Valid and the module is not pending removal
    pub fn is_current(&self) -> bool {
        self.is_valid()
            && self
                .module()
                .is_some_and(|module| !module.is_removal_pending())
    }

    /// Valid, and either still installed on its module or still depended upon
    pub fn is_in_use(&self) -> bool {
        if !self.is_valid() {
            return false;
        }
        match self.module() {
            Some(module) => module.installed_wiring_is(self) || module.has_dependents(),
            None => false,
        }
    }

    fn in_use_module(&self) -> Option<Arc<ModuleRecord>> {
        if self.is_in_use() {
            self.module()
        } else {
            None
        }
    }

    /// Capabilities this module was wired to, `None` once the view is unusable
    pub fn required_capabilities(
        &self,
        namespace: Option<&str>,
    ) -> Result<Option<Vec<WiredCapability>>, ModuleError> {
        let Some(module) = self.in_use_module() else {
            return Ok(None);
        };
        let mut result = Vec::new();
        if namespace_matches(namespace, MODULE_NAMESPACE) {
            result.extend(module.resolved_modules()?.iter().cloned().map(WiredCapability::Module));
        }
        if namespace_matches(namespace, PACKAGE_NAMESPACE) {
            result.extend(module.resolved_imports()?.iter().cloned().map(WiredCapability::Package));
        }
        result.extend(
            module
                .resolved_capabilities()?
                .iter()
                .filter(|cap| namespace_matches(namespace, &cap.namespace))
                .cloned()
                .map(WiredCapability::Generic),
        );
        Ok(Some(result))
    }

    /// Capabilities this module offers, `None` once the view is unusable
    pub fn provided_capabilities(
        &self,
        namespace: Option<&str>,
    ) -> Result<Option<Vec<WiredCapability>>, ModuleError> {
        let Some(module) = self.in_use_module() else {
            return Ok(None);
        };
        let mut result = Vec::new();
        if namespace_matches(namespace, MODULE_NAMESPACE) {
            result.push(WiredCapability::Module(module.module_capability()));
        }
        if namespace_matches(namespace, PACKAGE_NAMESPACE) {
            result.extend(module.selected_exports()?.iter().cloned().map(WiredCapability::Package));
        }
        result.extend(
            module
                .selected_capabilities()?
                .iter()
                .filter(|cap| namespace_matches(namespace, &cap.namespace))
                .cloned()
                .map(WiredCapability::Generic),
        );
        Ok(Some(result))
    }

    /// Fragments currently attached to the module
    pub fn fragment_revisions(&self) -> Result<Option<Vec<Arc<ModuleRecord>>>, ModuleError> {
        match self.in_use_module() {
            Some(module) => module.fragments().map(Some),
            None => Ok(None),
        }
    }

    pub fn user_object(&self) -> Option<UserObject> {
        self.module().and_then(|module| module.user_object())
    }
}

impl PartialEq for WiringView {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for WiringView {}

impl fmt::Display for WiringView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.module() {
            Some(module) => write!(f, "{}", module),
            None => write!(f, "<dropped module>"),
        }
    }
}

impl fmt::Debug for WiringView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiringView")
            .field("module", &self.module().map(|m| m.id()))
            .field("valid", &self.is_valid())
            .finish()
    }
}
