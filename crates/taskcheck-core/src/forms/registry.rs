//! Form registry and run capabilities.
//!
//! The registry maps a form id to its configuration and rule engine.
//! Adding a form is a registration, never a new branch in the analyzer.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::config::{FormDefinition, FormsConfig, FormsConfigError};
use crate::rules::{ReturningStudentsRules, RuleEngine, TrialConversionRules};

/// "Returning students" form.
pub const RETURNING_STUDENTS_FORM_ID: u64 = 2304918;

/// "Conversion after trial lesson" form.
pub const TRIAL_CONVERSION_FORM_ID: u64 = 792300;

type EngineFactory = fn(&FormDefinition) -> Option<Arc<dyn RuleEngine>>;

/// Built-in engines by form id.
const ENGINE_FACTORIES: &[(u64, EngineFactory)] = &[
    (RETURNING_STUDENTS_FORM_ID, returning_students_engine),
    (TRIAL_CONVERSION_FORM_ID, trial_conversion_engine),
];

fn returning_students_engine(def: &FormDefinition) -> Option<Arc<dyn RuleEngine>> {
    def.rules.as_ref()?;
    Some(Arc::new(ReturningStudentsRules::new(def)))
}

fn trial_conversion_engine(def: &FormDefinition) -> Option<Arc<dyn RuleEngine>> {
    def.rules.as_ref()?;
    Some(Arc::new(TrialConversionRules::new(def)))
}

struct RegisteredForm {
    definition: FormDefinition,
    engine: Option<Arc<dyn RuleEngine>>,
}

/// Registry of known forms.
#[derive(Default)]
pub struct FormRegistry {
    forms: BTreeMap<u64, RegisteredForm>,
}

impl FormRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every form of a configuration, without engines.
    pub fn from_config(config: FormsConfig) -> Self {
        let mut registry = Self::new();
        for definition in config.forms {
            registry.register_form(definition);
        }
        registry
    }

    /// Registry over the embedded configuration with built-in engines.
    pub fn builtin() -> Result<Self, FormsConfigError> {
        Ok(Self::from_config(FormsConfig::builtin()?).with_default_engines())
    }

    /// Attach the built-in engine to every registered form that has one.
    pub fn with_default_engines(mut self) -> Self {
        for (form_id, factory) in ENGINE_FACTORIES {
            if let Some(entry) = self.forms.get_mut(form_id) {
                if let Some(engine) = factory(&entry.definition) {
                    entry.engine = Some(engine);
                }
            }
        }
        self
    }

    /// Register a form. Replaces an existing definition with the same id
    /// and drops its engine.
    pub fn register_form(&mut self, definition: FormDefinition) {
        self.forms.insert(
            definition.id,
            RegisteredForm {
                definition,
                engine: None,
            },
        );
    }

    /// Register a rule engine for its form id.
    ///
    /// Returns false when no form with that id is registered.
    pub fn register_engine(&mut self, engine: Arc<dyn RuleEngine>) -> bool {
        match self.forms.get_mut(&engine.form_id()) {
            Some(entry) => {
                entry.engine = Some(engine);
                true
            }
            None => false,
        }
    }

    pub fn definition(&self, form_id: u64) -> Option<&FormDefinition> {
        self.forms.get(&form_id).map(|f| &f.definition)
    }

    pub fn engine(&self, form_id: u64) -> Option<&Arc<dyn RuleEngine>> {
        self.forms.get(&form_id).and_then(|f| f.engine.as_ref())
    }

    pub fn is_known(&self, form_id: u64) -> bool {
        self.forms.contains_key(&form_id)
    }

    /// Registered form ids, ascending.
    pub fn form_ids(&self) -> Vec<u64> {
        self.forms.keys().copied().collect()
    }
}

impl std::fmt::Debug for FormRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let engines: Vec<u64> = self
            .forms
            .iter()
            .filter(|(_, entry)| entry.engine.is_some())
            .map(|(id, _)| *id)
            .collect();
        f.debug_struct("FormRegistry")
            .field("forms", &self.form_ids())
            .field("engines", &engines)
            .finish()
    }
}

/// Which form types this run supports.
///
/// Built from a registry and optionally narrowed. The analyzer consults
/// it instead of any global availability flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    rules: BTreeSet<u64>,
    attendance: BTreeSet<u64>,
}

impl Capabilities {
    /// Nothing supported.
    pub fn none() -> Self {
        Self::default()
    }

    /// Everything the registry can do.
    pub fn from_registry(registry: &FormRegistry) -> Self {
        let mut caps = Self::none();
        for (form_id, entry) in &registry.forms {
            if entry.engine.is_some() {
                caps.rules.insert(*form_id);
            }
            if entry.definition.attendance.is_some() {
                caps.attendance.insert(*form_id);
            }
        }
        caps
    }

    pub fn with_rules(mut self, form_id: u64) -> Self {
        self.rules.insert(form_id);
        self
    }

    pub fn with_attendance(mut self, form_id: u64) -> Self {
        self.attendance.insert(form_id);
        self
    }

    pub fn without_rules(mut self, form_id: u64) -> Self {
        self.rules.remove(&form_id);
        self
    }

    pub fn without_attendance(mut self, form_id: u64) -> Self {
        self.attendance.remove(&form_id);
        self
    }

    pub fn supports_rules(&self, form_id: u64) -> bool {
        self.rules.contains(&form_id)
    }

    pub fn supports_attendance(&self, form_id: u64) -> bool {
        self.attendance.contains(&form_id)
    }
}
