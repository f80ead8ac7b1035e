//! The host sales document and the signing state attached to it.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type DocumentId = u64;
pub type PartnerId = u64;
pub type UserId = u64;

/// Reference to an artifact kept by the attachment store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Draft,
    Sent,
    Signed,
    Expired,
    Cancelled,
}

impl TransactionStatus {
    /// Map a status of the provider's vocabulary. Unknown values are still pending.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "SIGNED" => TransactionStatus::Signed,
            "EXPIRED" => TransactionStatus::Expired,
            "CANCELLED" => TransactionStatus::Cancelled,
            "CONFIGURED" => TransactionStatus::Sent,
            other => {
                log::warn!("Unknown provider status `{}`, treating as pending", other);
                TransactionStatus::Sent
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Signed | TransactionStatus::Expired | TransactionStatus::Cancelled
        )
    }

    /// Draft may only become Sent, Sent may end in any terminal state,
    /// terminal states never move.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            TransactionStatus::Draft => next == TransactionStatus::Sent,
            TransactionStatus::Sent => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStatus::Draft => "draft",
            TransactionStatus::Sent => "sent",
            TransactionStatus::Signed => "signed",
            TransactionStatus::Expired => "expired",
            TransactionStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Signing state stored on the host document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SignatureTransaction {
    transaction_id: Option<String>,
    document_identifier: Option<String>,
    signature_url: Option<String>,
    status: TransactionStatus,
    signed_document_ref: Option<ArtifactRef>,
}

impl SignatureTransaction {
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Identifier of the uploaded PDF inside the provider transaction.
    pub fn document_identifier(&self) -> Option<&str> {
        self.document_identifier.as_deref()
    }

    pub fn signature_url(&self) -> Option<&str> {
        self.signature_url.as_deref()
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn signed_document_ref(&self) -> Option<&ArtifactRef> {
        self.signed_document_ref.as_ref()
    }

    /// Record a launched transaction. Only allowed once, from `Draft`.
    pub fn mark_sent(
        &mut self,
        transaction_id: &str,
        document_identifier: &str,
        signature_url: Option<String>,
    ) -> Result<(), Error> {
        if self.transaction_id.is_some() {
            return Err(Error::Validation(
                "This document was already sent for signature.".to_owned(),
            ));
        }
        self.advance(TransactionStatus::Sent)?;
        self.transaction_id = Some(transaction_id.to_owned());
        self.document_identifier = Some(document_identifier.to_owned());
        self.signature_url = signature_url;
        Ok(())
    }

    /// Move to `next`. Returns `false` when the status is already `next`.
    pub fn advance(&mut self, next: TransactionStatus) -> Result<bool, Error> {
        if self.status == next {
            return Ok(false);
        }
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(true)
    }

    /// Attach the downloaded signed document. Set at most once, after `Signed`.
    pub fn attach_signed_document(&mut self, artifact: ArtifactRef) -> Result<(), Error> {
        if self.status != TransactionStatus::Signed {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: "signed document attached".to_owned(),
            });
        }
        if self.signed_document_ref.is_some() {
            return Err(Error::Validation(
                "A signed document is already attached.".to_owned(),
            ));
        }
        self.signed_document_ref = Some(artifact);
        Ok(())
    }
}

/// A sales quotation, as far as signing is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDocument {
    pub id: DocumentId,
    /// Document reference, e.g. `S00042`.
    pub name: String,
    /// The customer.
    pub partner_id: PartnerId,
    /// Salesperson responsible for the document.
    pub owner_id: Option<UserId>,
    /// Owning company.
    pub company_id: Option<u64>,
    #[serde(default)]
    pub signature: SignatureTransaction,
}

impl SaleDocument {
    pub fn new(id: DocumentId, name: &str, partner_id: PartnerId) -> Self {
        SaleDocument {
            id,
            name: name.to_owned(),
            partner_id,
            owner_id: None,
            company_id: None,
            signature: SignatureTransaction::default(),
        }
    }

    pub fn pdf_file_name(&self) -> String {
        format!("{}.pdf", self.name)
    }

    pub fn signed_file_name(&self) -> String {
        format!("{}_signed.pdf", self.name)
    }
}
