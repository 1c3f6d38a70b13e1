//! Reference type to posting routine registry.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::event::ReferenceType;

/// Routing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouterError {
    /// Raised at startup; workers must not start with gaps.
    #[error("No posting routine registered for: {}", format_types(.0))]
    MissingHandlers(Vec<ReferenceType>),

    #[error("No posting routine registered for {0}")]
    NoHandler(ReferenceType),
}

fn format_types(types: &[ReferenceType]) -> String {
    types
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Table of handlers keyed by reference type.
///
/// Generic over the handler so the database layer can register trait objects
/// (`HandlerRegistry<dyn PostingRoutine>`) without this crate knowing about them.
pub struct HandlerRegistry<H: ?Sized> {
    handlers: HashMap<ReferenceType, Arc<H>>,
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<H: ?Sized> Clone for HandlerRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<H: ?Sized> HandlerRegistry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for one reference type, replacing any previous one.
    pub fn register(&mut self, reference_type: ReferenceType, handler: Arc<H>) -> &mut Self {
        self.handlers.insert(reference_type, handler);
        self
    }

    /// Registers the same handler for several reference types.
    pub fn register_all(
        &mut self,
        reference_types: impl IntoIterator<Item = ReferenceType>,
        handler: &Arc<H>,
    ) -> &mut Self {
        for reference_type in reference_types {
            self.handlers.insert(reference_type, Arc::clone(handler));
        }
        self
    }

    /// Fails if any reference type has no handler.
    pub fn validate(&self) -> Result<(), RouterError> {
        let missing: Vec<_> = ReferenceType::ALL
            .into_iter()
            .filter(|rt| !self.handlers.contains_key(rt))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RouterError::MissingHandlers(missing))
        }
    }

    pub fn resolve(&self, reference_type: ReferenceType) -> Result<&Arc<H>, RouterError> {
        self.handlers
            .get(&reference_type)
            .ok_or(RouterError::NoHandler(reference_type))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
