//! Priority-ordered registry of task providers grouped by capability
//! category.
//!
//! Ordering law: descending priority, ties broken by original registration
//! order. The resort is stable and re-applies the registration order as an
//! explicit tie-break, so repeated updates never churn equal-priority
//! providers.

use std::collections::BTreeSet;
use std::fmt;

use contracts::ProviderSpec;

use crate::provider::WorkProvider;

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// A provider registered with an empty id.
    EmptyProviderId,
    /// A provider registered with no capability categories.
    NoCategories { provider_id: String },
    /// Priority must be a finite float.
    InvalidPriority { provider_id: String, priority: f32 },
    /// A zero candidate cap would make the provider permanently empty.
    ZeroCandidateCap { provider_id: String },
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::EmptyProviderId => {
                write!(f, "provider registered with an empty id")
            }
            RegistrationError::NoCategories { provider_id } => {
                write!(f, "provider {provider_id} declares no capability categories")
            }
            RegistrationError::InvalidPriority {
                provider_id,
                priority,
            } => write!(
                f,
                "provider {provider_id} has non-finite priority {priority}"
            ),
            RegistrationError::ZeroCandidateCap { provider_id } => {
                write!(f, "provider {provider_id} declares a zero candidate cap")
            }
        }
    }
}

impl std::error::Error for RegistrationError {}

struct RegisteredProvider {
    registration_order: u64,
    provider: Box<dyn WorkProvider>,
}

pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
    next_registration_order: u64,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            next_registration_order: 0,
        }
    }

    /// Register a provider, or update it in place if the id already
    /// exists. Either way the registry is re-sorted afterwards; an updated
    /// provider keeps its original registration order for tie-breaking.
    pub fn register(&mut self, provider: Box<dyn WorkProvider>) -> Result<(), RegistrationError> {
        validate_spec(provider.spec())?;

        let provider_id = provider.spec().provider_id.clone();
        match self
            .providers
            .iter_mut()
            .find(|entry| entry.provider.spec().provider_id == provider_id)
        {
            Some(entry) => {
                entry.provider = provider;
            }
            None => {
                self.providers.push(RegisteredProvider {
                    registration_order: self.next_registration_order,
                    provider,
                });
                self.next_registration_order = self.next_registration_order.saturating_add(1);
            }
        }
        self.resort();
        Ok(())
    }

    fn resort(&mut self) {
        self.providers.sort_by(|a, b| {
            b.provider
                .spec()
                .priority
                .partial_cmp(&a.provider.spec().priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.registration_order.cmp(&b.registration_order))
        });
    }

    /// Providers servicing `category`, in descending-priority order.
    pub fn providers_for_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a dyn WorkProvider> {
        self.providers
            .iter()
            .filter(move |entry| {
                entry
                    .provider
                    .spec()
                    .categories
                    .iter()
                    .any(|declared| declared == category)
            })
            .map(|entry| entry.provider.as_ref())
    }

    /// Ids of providers servicing any of `permitted`, in probe order. One
    /// provider appears once even when it spans several categories.
    pub fn ordered_ids_for(&self, permitted: &BTreeSet<String>) -> Vec<String> {
        self.providers
            .iter()
            .filter(|entry| {
                entry
                    .provider
                    .spec()
                    .categories
                    .iter()
                    .any(|declared| permitted.contains(declared))
            })
            .map(|entry| entry.provider.spec().provider_id.clone())
            .collect()
    }

    pub fn by_id(&self, provider_id: &str) -> Option<&dyn WorkProvider> {
        self.providers
            .iter()
            .find(|entry| entry.provider.spec().provider_id == provider_id)
            .map(|entry| entry.provider.as_ref())
    }

    /// Union of every declared category, for permission refreshes.
    pub fn all_categories(&self) -> Vec<String> {
        let mut categories = BTreeSet::new();
        for entry in &self.providers {
            for category in &entry.provider.spec().categories {
                categories.insert(category.clone());
            }
        }
        categories.into_iter().collect()
    }

    pub fn specs(&self) -> Vec<ProviderSpec> {
        self.providers
            .iter()
            .map(|entry| entry.provider.spec().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Drop every provider (full reload hook).
    pub fn reset(&mut self) {
        self.providers.clear();
        self.next_registration_order = 0;
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("specs", &self.specs())
            .finish()
    }
}

fn validate_spec(spec: &ProviderSpec) -> Result<(), RegistrationError> {
    if spec.provider_id.trim().is_empty() {
        return Err(RegistrationError::EmptyProviderId);
    }
    if spec.categories.is_empty() {
        return Err(RegistrationError::NoCategories {
            provider_id: spec.provider_id.clone(),
        });
    }
    if !spec.priority.is_finite() {
        return Err(RegistrationError::InvalidPriority {
            provider_id: spec.provider_id.clone(),
            priority: spec.priority,
        });
    }
    if spec.max_candidates == 0 {
        return Err(RegistrationError::ZeroCandidateCap {
            provider_id: spec.provider_id.clone(),
        });
    }
    Ok(())
}
