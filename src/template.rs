//! Signature templates: where the signature mark goes and which signing
//! strength is requested.

use crate::config::{self, ConfigSource};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

pub type TemplateId = u64;
/// Owning scope of a template (the company).
pub type ScopeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageType {
    SpecificPage,
    LastPage,
}

/// Signing strengths supported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SignatureType {
    #[default]
    #[serde(rename = "CERTIFIED_TIMESTAMP")]
    CertifiedTimestamp,
    #[serde(rename = "DIGI_GO")]
    DigiGo,
    /// The signer chooses when signing.
    #[serde(rename = "Later")]
    ChooseLater,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureTemplate {
    pub id: TemplateId,
    pub name: String,
    pub sequence: i32,
    pub active: bool,
    pub is_default: bool,
    /// `None` means the template is shared by every scope.
    pub scope: Option<ScopeId>,
    pub x: i64,
    pub y: i64,
    pub page_type: PageType,
    /// Only meaningful for [`PageType::SpecificPage`].
    pub page_number: i64,
    pub signature_type: SignatureType,
}

impl SignatureTemplate {
    pub fn new(id: TemplateId, name: &str) -> Self {
        SignatureTemplate {
            id,
            name: name.to_owned(),
            sequence: 10,
            active: true,
            is_default: false,
            scope: None,
            x: 100,
            y: 100,
            page_type: PageType::LastPage,
            page_number: 1,
            signature_type: SignatureType::default(),
        }
    }

    /// Checks that only look at this template.
    pub fn validate(&self) -> Result<(), Error> {
        if self.page_type == PageType::SpecificPage && self.page_number < 1 {
            return Err(Error::Validation(format!(
                "Template `{}`: page number must be greater than 0.",
                self.name
            )));
        }
        if self.x < 0 || self.y < 0 {
            return Err(Error::Validation(format!(
                "Template `{}`: coordinates must be non-negative values.",
                self.name
            )));
        }
        Ok(())
    }

    /// Page to sign for a document of `total_pages` pages.
    /// A specific page beyond the end of the document is clamped to the last page.
    pub fn resolve_page_number(&self, total_pages: u32) -> Result<u32, Error> {
        match self.page_type {
            PageType::LastPage => Ok(total_pages),
            PageType::SpecificPage => {
                let page = specific_page(self)?;
                Ok(page.min(total_pages))
            }
        }
    }

    fn visible_in(&self, scope: Option<ScopeId>) -> bool {
        self.scope.is_none() || self.scope == scope
    }
}

/// The configured page of a [`PageType::SpecificPage`] template.
pub(crate) fn specific_page(template: &SignatureTemplate) -> Result<u32, Error> {
    u32::try_from(template.page_number)
        .ok()
        .filter(|page| *page > 0)
        .ok_or_else(|| {
            Error::InvalidTemplate(format!(
                "The template specifies an invalid page number: {}.",
                template.page_number
            ))
        })
}

/// Store of the signature templates.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: RwLock<BTreeMap<TemplateId, SignatureTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: SignatureTemplate) -> Result<(), Error> {
        let mut templates = self.write()?;
        if templates.contains_key(&template.id) {
            return Err(Error::Validation(format!(
                "A template with id {} already exists.",
                template.id
            )));
        }
        Self::check_write(&templates, &template)?;
        log::info!("Created signature template `{}`", template.name);
        templates.insert(template.id, template);
        Ok(())
    }

    pub fn update(&self, template: SignatureTemplate) -> Result<(), Error> {
        let mut templates = self.write()?;
        if !templates.contains_key(&template.id) {
            return Err(Error::Validation(format!(
                "The signature template (ID: {}) could not be found.",
                template.id
            )));
        }
        Self::check_write(&templates, &template)?;
        templates.insert(template.id, template);
        Ok(())
    }

    /// Deactivate a template. An archived template is never picked as default.
    pub fn archive(&self, id: TemplateId) -> Result<(), Error> {
        let mut templates = self.write()?;
        let template = templates.get_mut(&id).ok_or_else(|| {
            Error::Validation(format!(
                "The signature template (ID: {}) could not be found.",
                id
            ))
        })?;
        template.active = false;
        Ok(())
    }

    pub fn get(&self, id: TemplateId) -> Option<SignatureTemplate> {
        self.templates.read().ok()?.get(&id).cloned()
    }

    /// Active templates visible from `scope`, ordered by `(sequence, name)`.
    pub fn list_active(&self, scope: Option<ScopeId>) -> Vec<SignatureTemplate> {
        let templates = match self.templates.read() {
            Ok(templates) => templates,
            Err(_) => return Vec::new(),
        };
        let mut list: Vec<SignatureTemplate> = templates
            .values()
            .filter(|t| t.active && t.visible_in(scope))
            .cloned()
            .collect();
        list.sort_by(|a, b| (a.sequence, &a.name).cmp(&(b.sequence, &b.name)));
        list
    }

    /// Default template for `scope`. In order of priority:
    /// 1. the template flagged as default,
    /// 2. the globally configured default template,
    /// 3. the first active template.
    pub fn get_default(
        &self,
        scope: Option<ScopeId>,
        config: &dyn ConfigSource,
    ) -> Option<SignatureTemplate> {
        let active = self.list_active(scope);
        if let Some(flagged) = active.iter().find(|t| t.is_default) {
            return Some(flagged.clone());
        }
        if let Some(id) = config::default_template_id(config) {
            if let Some(configured) = active.iter().find(|t| t.id == id) {
                return Some(configured.clone());
            }
            log::warn!("Configured default template {} is not available", id);
        }
        active.into_iter().next()
    }

    fn check_write(
        templates: &BTreeMap<TemplateId, SignatureTemplate>,
        template: &SignatureTemplate,
    ) -> Result<(), Error> {
        template.validate()?;
        if template.is_default && template.active {
            let conflict = templates.values().find(|other| {
                other.id != template.id
                    && other.active
                    && other.is_default
                    && other.scope == template.scope
            });
            if let Some(conflict) = conflict {
                return Err(Error::Validation(format!(
                    "Only one default signature template is allowed. `{}` is already the default.",
                    conflict.name
                )));
            }
        }
        Ok(())
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<TemplateId, SignatureTemplate>>, Error>
    {
        self.templates
            .write()
            .map_err(|_| Error::Host("template registry lock poisoned".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryConfig, DEFAULT_TEMPLATE_PARAM};

    fn specific(page_number: i64) -> SignatureTemplate {
        let mut template = SignatureTemplate::new(1, "Specific");
        template.page_type = PageType::SpecificPage;
        template.page_number = page_number;
        template
    }

    #[test]
    fn last_page_resolves_to_total() {
        let template = SignatureTemplate::new(1, "Last");
        for total in 1..20 {
            assert_eq!(template.resolve_page_number(total).unwrap(), total);
        }
    }

    #[test]
    fn specific_page_is_clamped_to_document_end() {
        assert_eq!(specific(2).resolve_page_number(5).unwrap(), 2);
        assert_eq!(specific(5).resolve_page_number(5).unwrap(), 5);
        assert_eq!(specific(9).resolve_page_number(3).unwrap(), 3);
    }

    #[test]
    fn non_positive_page_is_never_clamped_to_one() {
        assert!(matches!(
            specific(0).resolve_page_number(4),
            Err(Error::InvalidTemplate(_))
        ));
        assert!(matches!(
            specific(-3).resolve_page_number(4),
            Err(Error::InvalidTemplate(_))
        ));
    }

    #[test]
    fn write_rejects_bad_settings() {
        let registry = TemplateRegistry::new();
        assert!(matches!(
            registry.insert(specific(0)),
            Err(Error::Validation(_))
        ));
        let mut negative = SignatureTemplate::new(2, "Negative");
        negative.y = -1;
        assert!(matches!(
            registry.insert(negative),
            Err(Error::Validation(_))
        ));
        // page number of a last-page template is ignored
        let mut last = SignatureTemplate::new(3, "Last");
        last.page_number = 0;
        assert!(registry.insert(last).is_ok());
    }

    #[test]
    fn second_default_in_scope_is_rejected() {
        let registry = TemplateRegistry::new();
        let mut first = SignatureTemplate::new(1, "Quotes");
        first.is_default = true;
        first.scope = Some(1);
        registry.insert(first).unwrap();

        let mut second = SignatureTemplate::new(2, "Contracts");
        second.is_default = true;
        second.scope = Some(1);
        match registry.insert(second.clone()) {
            Err(Error::Validation(message)) => assert!(message.contains("Quotes")),
            other => panic!("unexpected result: {:?}", other),
        }

        // Another scope may have its own default.
        second.scope = Some(2);
        assert!(registry.insert(second).is_ok());
    }

    #[test]
    fn archived_default_frees_the_slot() {
        let registry = TemplateRegistry::new();
        let mut first = SignatureTemplate::new(1, "Old");
        first.is_default = true;
        registry.insert(first).unwrap();
        registry.archive(1).unwrap();

        let mut second = SignatureTemplate::new(2, "New");
        second.is_default = true;
        assert!(registry.insert(second).is_ok());
    }

    #[test]
    fn default_priority() {
        let config = MemoryConfig::new();
        let registry = TemplateRegistry::new();
        assert_eq!(registry.get_default(Some(1), &config), None);

        let mut b = SignatureTemplate::new(1, "B");
        b.sequence = 5;
        let mut a = SignatureTemplate::new(2, "A");
        a.sequence = 5;
        let late = SignatureTemplate::new(3, "Late");
        registry.insert(b).unwrap();
        registry.insert(a).unwrap();
        registry.insert(late).unwrap();

        // first by (sequence, name)
        assert_eq!(registry.get_default(Some(1), &config).unwrap().name, "A");

        config.set_param(DEFAULT_TEMPLATE_PARAM, "3");
        assert_eq!(registry.get_default(Some(1), &config).unwrap().name, "Late");

        let mut flagged = registry.get(1).unwrap();
        flagged.is_default = true;
        registry.update(flagged).unwrap();
        assert_eq!(registry.get_default(Some(1), &config).unwrap().name, "B");
    }

    #[test]
    fn templates_of_other_scopes_are_hidden() {
        let config = MemoryConfig::new();
        let registry = TemplateRegistry::new();
        let mut other = SignatureTemplate::new(1, "Other company");
        other.scope = Some(2);
        other.is_default = true;
        registry.insert(other).unwrap();
        assert_eq!(registry.get_default(Some(1), &config), None);
        assert_eq!(registry.list_active(Some(2)).len(), 1);
    }
}
