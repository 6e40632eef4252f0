//! Registry of UI contributions from enabled extensions.
//!
//! Readers take immutable [`RegistrySnapshot`]s; all mutation goes through
//! [`IntegrationRegistry`]. The registry is fed from lifecycle events so it
//! converges with backend state no matter which client caused a change.

mod slots;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

pub use slots::{SlotContribution, SlotTable};

use crate::lifecycle::{LifecycleEvent, LifecycleEventKind};
use crate::manifest::Capabilities;
use crate::registry::{ExtensionStatus, RegistryEntry};

/// A named set of hooks contributed by one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Integration {
    pub name: String,
    pub source_id: String,
    pub hooks: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

/// Callback form of an extension module.
pub type RegisterFn = Box<dyn FnOnce(&mut ModuleContext) + Send>;

/// The shapes an extension module may take.
pub enum ExtensionModule {
    /// Static name and hook list.
    Descriptor { name: String, hooks: Vec<String> },
    /// A function that registers its own integrations and slots.
    Register(RegisterFn),
    /// A bare component with no hooks.
    ComponentOnly { name: String, component: String },
}

impl fmt::Debug for ExtensionModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor { name, hooks } => f
                .debug_struct("Descriptor")
                .field("name", name)
                .field("hooks", hooks)
                .finish(),
            Self::Register(_) => f.write_str("Register(..)"),
            Self::ComponentOnly { name, component } => f
                .debug_struct("ComponentOnly")
                .field("name", name)
                .field("component", component)
                .finish(),
        }
    }
}

impl ExtensionModule {
    pub fn register(f: impl FnOnce(&mut ModuleContext) + Send + 'static) -> Self {
        Self::Register(Box::new(f))
    }

    /// Normalize into integrations and slot contributions owned by `source_id`.
    pub fn load(self, source_id: &str) -> LoadedModule {
        let mut ctx = ModuleContext::new(source_id);
        match self {
            Self::Descriptor { name, hooks } => ctx.integration(name, hooks),
            Self::Register(f) => f(&mut ctx),
            Self::ComponentOnly { name, component } => {
                ctx.integrations.push(Integration {
                    name,
                    source_id: source_id.to_string(),
                    hooks: BTreeSet::new(),
                    component: Some(component),
                });
            }
        }
        ctx.finish()
    }
}

/// Collects what a module contributes while it loads.
#[derive(Debug)]
pub struct ModuleContext {
    source_id: String,
    integrations: Vec<Integration>,
    slots: Vec<(String, SlotContribution)>,
}

impl ModuleContext {
    fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            integrations: Vec::new(),
            slots: Vec::new(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn integration(
        &mut self,
        name: impl Into<String>,
        hooks: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.integrations.push(Integration {
            name: name.into(),
            source_id: self.source_id.clone(),
            hooks: hooks.into_iter().map(Into::into).collect(),
            component: None,
        });
    }

    pub fn slot(&mut self, slot: impl Into<String>, component: impl Into<String>, order: i32) {
        let contribution = SlotContribution::new(self.source_id.clone(), component, order);
        self.slots.push((slot.into(), contribution));
    }

    fn finish(self) -> LoadedModule {
        LoadedModule {
            source_id: self.source_id,
            integrations: self.integrations,
            slots: self.slots,
        }
    }
}

/// Normalized contributions of one extension.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedModule {
    pub source_id: String,
    pub integrations: Vec<Integration>,
    pub slots: Vec<(String, SlotContribution)>,
}

impl LoadedModule {
    /// Contributions implied by a manifest's declared capabilities: one
    /// integration named after the extension carrying its hooks, and one
    /// component `<id>:<slot>` per slot.
    pub fn from_capabilities(id: &str, capabilities: &Capabilities) -> Self {
        ExtensionModule::register({
            let id = id.to_string();
            let capabilities = capabilities.clone();
            move |ctx: &mut ModuleContext| {
                ctx.integration(id.clone(), capabilities.hooks.iter().cloned());
                for slot in &capabilities.slots {
                    ctx.slot(slot.clone(), format!("{id}:{slot}"), 0);
                }
            }
        })
        .load(id)
    }
}

/// Immutable view handed to readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Incremented on every mutation.
    pub version: u64,
    pub integrations: Vec<Integration>,
    pub slots: BTreeMap<String, Vec<SlotContribution>>,
    /// Hook name to the names of integrations implementing it.
    pub hooks: BTreeMap<String, Vec<String>>,
}

impl RegistrySnapshot {
    pub fn is_active(&self, source_id: &str) -> bool {
        self.integrations.iter().any(|i| i.source_id == source_id)
            || self
                .slots
                .values()
                .flatten()
                .any(|c| c.source_id == source_id)
    }

    pub fn contributions(&self, slot: &str) -> &[SlotContribution] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn subscribers(&self, hook: &str) -> &[String] {
        self.hooks.get(hook).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
struct Inner {
    integrations: Vec<Integration>,
    slots: SlotTable,
    snapshot: Arc<RegistrySnapshot>,
}

impl Inner {
    fn rebuild(&mut self) {
        let mut hooks: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for integration in &self.integrations {
            for hook in &integration.hooks {
                hooks
                    .entry(hook.clone())
                    .or_default()
                    .push(integration.name.clone());
            }
        }
        self.snapshot = Arc::new(RegistrySnapshot {
            version: self.snapshot.version + 1,
            integrations: self.integrations.clone(),
            slots: self.slots.to_map(),
            hooks,
        });
    }

    fn register(&mut self, integration: Integration) -> bool {
        match self
            .integrations
            .iter_mut()
            .find(|i| i.name == integration.name)
        {
            Some(existing) => {
                *existing = integration;
                true
            }
            None => {
                self.integrations.push(integration);
                false
            }
        }
    }

    fn unregister_by_source(&mut self, source_id: &str) -> usize {
        let before = self.integrations.len();
        self.integrations.retain(|i| i.source_id != source_id);
        (before - self.integrations.len()) + self.slots.unregister_by_source(source_id)
    }
}

/// Explicitly constructed registry of active UI contributions.
#[derive(Debug, Default)]
pub struct IntegrationRegistry {
    inner: RwLock<Inner>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let value = f(&mut inner);
        inner.rebuild();
        value
    }

    /// Add an integration, replacing one with the same name. Returns whether
    /// an existing integration was replaced.
    pub fn register(&self, integration: Integration) -> bool {
        self.mutate(|inner| inner.register(integration))
    }

    /// Remove the integration called `name` and any named `name:<suffix>`.
    /// Returns whether anything was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let prefix = format!("{name}:");
        self.mutate(|inner| {
            let before = inner.integrations.len();
            inner
                .integrations
                .retain(|i| i.name != name && !i.name.starts_with(&prefix));
            inner.integrations.len() != before
        })
    }

    /// Slot contribution operations.
    pub fn slots(&self) -> Slots<'_> {
        Slots { registry: self }
    }

    /// Replace everything `module.source_id` contributed with `module`.
    pub fn load(&self, module: LoadedModule) {
        self.mutate(|inner| {
            inner.unregister_by_source(&module.source_id);
            for integration in module.integrations {
                inner.register(integration);
            }
            for (slot, contribution) in module.slots {
                inner.slots.register(&slot, contribution);
            }
        });
        debug!(extension_id = %module.source_id, "Loaded extension integrations");
    }

    /// Remove every integration and slot contribution from `source_id`.
    pub fn unregister_by_source(&self, source_id: &str) -> usize {
        self.mutate(|inner| inner.unregister_by_source(source_id))
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(
            &self
                .inner
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot,
        )
    }

    /// Follow a lifecycle transition.
    pub fn apply(&self, event: &LifecycleEvent) {
        match event.kind {
            LifecycleEventKind::Enabled | LifecycleEventKind::Activated => {
                if let Some(manifest) = &event.manifest {
                    self.load(LoadedModule::from_capabilities(
                        &manifest.id,
                        &manifest.capabilities,
                    ));
                }
            }
            LifecycleEventKind::Disabled | LifecycleEventKind::Uninstalled => {
                self.unregister_by_source(&event.id);
            }
            LifecycleEventKind::Installed => {}
        }
    }

    /// Converge with a full listing: load active extensions, drop everything
    /// else. Entries still loading are left as they are.
    pub fn sync(&self, entries: &[RegistryEntry]) {
        self.mutate(|inner| {
            let listed: BTreeSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
            let stale: BTreeSet<String> = inner
                .integrations
                .iter()
                .map(|i| i.source_id.as_str())
                .chain(inner.slots.sources())
                .filter(|source| !listed.contains(source))
                .map(str::to_string)
                .collect();
            for source in stale {
                inner.unregister_by_source(&source);
            }

            for entry in entries {
                match entry.status {
                    ExtensionStatus::Active => {
                        let module = LoadedModule::from_capabilities(&entry.id, &entry.capabilities);
                        inner.unregister_by_source(&module.source_id);
                        for integration in module.integrations {
                            inner.register(integration);
                        }
                        for (slot, contribution) in module.slots {
                            inner.slots.register(&slot, contribution);
                        }
                    }
                    ExtensionStatus::Inactive | ExtensionStatus::Error => {
                        inner.unregister_by_source(&entry.id);
                    }
                    ExtensionStatus::Loading => {}
                }
            }
        });
    }
}

/// Handle for slot operations on an [`IntegrationRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct Slots<'a> {
    registry: &'a IntegrationRegistry,
}

impl Slots<'_> {
    pub fn register(&self, slot: &str, contribution: SlotContribution) {
        self.registry
            .mutate(|inner| inner.slots.register(slot, contribution));
    }

    pub fn unregister_by_source(&self, source_id: &str) -> usize {
        self.registry
            .mutate(|inner| inner.slots.unregister_by_source(source_id))
    }
}
