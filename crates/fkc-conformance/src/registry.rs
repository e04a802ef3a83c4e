#![forbid(unsafe_code)]

use crate::HarnessError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Inputs handed to a test body for one repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseContext {
    pub case_index: usize,
    pub seed: u64,
}

pub type TestFn = dyn Fn(&CaseContext) -> Result<bool, HarnessError> + Send + Sync;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestMetadata {
    name: String,
    repeat: usize,
    description: String,
    accepted_error: f64,
}

impl TestMetadata {
    pub fn new(
        name: impl Into<String>,
        repeat: usize,
        description: impl Into<String>,
        accepted_error: f64,
    ) -> Result<Self, HarnessError> {
        let name = name.into();
        let invalid = |detail: &str| HarnessError::InvalidMetadata {
            name: name.clone(),
            detail: detail.to_string(),
        };
        if name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if repeat == 0 {
            return Err(invalid("repeat must be > 0"));
        }
        if !(accepted_error.is_finite() && accepted_error > 0.0) {
            return Err(invalid("accepted_error must be a positive finite number"));
        }
        Ok(Self {
            name,
            repeat,
            description: description.into(),
            accepted_error,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn repeat(&self) -> usize {
        self.repeat
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn accepted_error(&self) -> f64 {
        self.accepted_error
    }
}

/// A test body paired with the metadata it was registered under.
#[derive(Clone)]
pub struct TestDefinition {
    metadata: TestMetadata,
    function: Arc<TestFn>,
}

impl std::fmt::Debug for TestDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDefinition")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl TestDefinition {
    pub fn new<F>(metadata: TestMetadata, function: F) -> Self
    where
        F: Fn(&CaseContext) -> Result<bool, HarnessError> + Send + Sync + 'static,
    {
        Self {
            metadata,
            function: Arc::new(function),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &TestMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    #[must_use]
    pub fn repeat(&self) -> usize {
        self.metadata.repeat()
    }

    /// Runs the body exactly once.
    pub fn invoke(&self, ctx: &CaseContext) -> Result<bool, HarnessError> {
        (self.function)(ctx)
    }
}

/// Name-unique collection of tests, kept in registration order.
#[derive(Debug, Default, Clone)]
pub struct TestRegistry {
    entries: Vec<TestDefinition>,
    by_name: BTreeMap<String, usize>,
}

impl TestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: TestDefinition) -> Result<(), HarnessError> {
        let name = definition.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(HarnessError::DuplicateTestName(name));
        }
        self.by_name.insert(name, self.entries.len());
        self.entries.push(definition);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TestDefinition> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn require(&self, name: &str) -> Result<&TestDefinition, HarnessError> {
        self.get(name)
            .ok_or_else(|| HarnessError::UnknownTest(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestDefinition> {
        self.entries.iter()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(TestDefinition::name).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
