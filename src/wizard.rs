//! Signer selection form shown when signing is started without a signer.

use crate::document::{DocumentId, PartnerId};
use crate::host::{Contact, ContactDirectory};
use crate::orchestrator::{SigningOrchestrator, SigningOutcome, WizardPrompt};
use crate::template::TemplateId;
use crate::{Error, SignerInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerWizard {
    pub document_id: DocumentId,
    pub partner_id: PartnerId,
    pub signer: Option<Contact>,
    pub email: String,
    pub phone: String,
    /// Write the edited email/phone back to the contact on confirm.
    pub update_contact: bool,
    pub template_id: Option<TemplateId>,
}

impl SignerWizard {
    pub fn from_prompt(prompt: &WizardPrompt) -> Self {
        SignerWizard {
            document_id: prompt.document_id,
            partner_id: prompt.partner_id,
            signer: None,
            email: String::new(),
            phone: String::new(),
            update_contact: false,
            template_id: prompt.default_template_id,
        }
    }

    /// Contacts of the customer that may be picked as signer.
    pub fn eligible_signers(&self, contacts: &dyn ContactDirectory) -> Vec<Contact> {
        contacts.children_of(self.partner_id)
    }

    /// Pick (or clear) the signer, filling email and phone from the contact.
    /// `update_contact` is ticked when the contact misses one of them.
    pub fn select_signer(&mut self, signer: Option<Contact>) {
        match &signer {
            Some(contact) => {
                self.email = contact.email.clone().unwrap_or_default();
                self.phone = contact.phone.clone().unwrap_or_default();
                self.update_contact = is_blank(&contact.email) || is_blank(&contact.phone);
            }
            None => {
                self.email.clear();
                self.phone.clear();
                self.update_contact = false;
            }
        }
        self.signer = signer;
    }

    /// Validate the form and send the document.
    pub fn confirm(
        &self,
        orchestrator: &SigningOrchestrator,
        contacts: &dyn ContactDirectory,
    ) -> Result<SigningOutcome, Error> {
        let contact = self
            .signer
            .as_ref()
            .ok_or_else(|| Error::Validation("Please select a contact.".to_owned()))?;
        let email = self.email.trim();
        if email.is_empty() {
            return Err(Error::Validation(
                "Email is required to send for signature.".to_owned(),
            ));
        }
        let phone = Some(self.phone.trim()).filter(|phone| !phone.is_empty());

        if self.update_contact {
            contacts.update_contact(contact.id, email, phone)?;
        }

        let mut signer = SignerInfo::new(&contact.name, email);
        if let Some(phone) = phone {
            signer = signer.with_phone(phone);
        }
        orchestrator.initiate_signing(self.document_id, Some(signer), self.template_id)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wizard() -> SignerWizard {
        SignerWizard::from_prompt(&WizardPrompt {
            title: "t".to_owned(),
            document_id: 1,
            partner_id: 10,
            default_template_id: Some(4),
        })
    }

    fn contact(email: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            id: 11,
            name: "Jane Doe".to_owned(),
            parent_id: Some(10),
            email: email.map(str::to_owned),
            phone: phone.map(str::to_owned),
        }
    }

    #[test]
    fn selecting_a_complete_contact_fills_fields() {
        let mut wizard = wizard();
        wizard.select_signer(Some(contact(Some("jane@example.com"), Some("+32 1"))));
        assert_eq!(wizard.email, "jane@example.com");
        assert_eq!(wizard.phone, "+32 1");
        assert!(!wizard.update_contact);
        assert_eq!(wizard.template_id, Some(4));
    }

    #[test]
    fn missing_phone_ticks_update() {
        let mut wizard = wizard();
        wizard.select_signer(Some(contact(Some("jane@example.com"), None)));
        assert!(wizard.update_contact);
        wizard.select_signer(None);
        assert!(!wizard.update_contact);
        assert!(wizard.email.is_empty());
    }
}
