//! Services of the host ERP this crate relies on.

use crate::document::{ArtifactRef, DocumentId, PartnerId, SaleDocument, UserId};
use crate::Error;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Produces the quotation PDF of a document.
pub trait DocumentRenderer: Send + Sync {
    fn render(&self, document_id: DocumentId) -> Result<Vec<u8>, Error>;
}

impl<F> DocumentRenderer for F
where
    F: Fn(DocumentId) -> Result<Vec<u8>, Error> + Send + Sync,
{
    fn render(&self, document_id: DocumentId) -> Result<Vec<u8>, Error> {
        self(document_id)
    }
}

/// Record store of the sales documents.
pub trait DocumentRepository: Send + Sync {
    fn load(&self, id: DocumentId) -> Result<SaleDocument, Error>;
    fn save(&self, document: &SaleDocument) -> Result<(), Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Todo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub document_id: DocumentId,
    pub kind: TaskKind,
    pub summary: String,
    pub note: String,
    pub assignee: Option<UserId>,
    pub due: NaiveDate,
}

/// Activity/task system of the host.
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, task: TaskRequest) -> Result<(), Error>;
    /// Mark the open tasks of `document_id` with this summary as done.
    /// Returns how many were completed.
    fn complete_matching(&self, document_id: DocumentId, summary: &str) -> Result<usize, Error>;
}

/// Chatter of a document.
pub trait AuditLog: Send + Sync {
    fn append_note(&self, document_id: DocumentId, text: &str) -> Result<(), Error>;
}

pub trait AttachmentStore: Send + Sync {
    fn store(
        &self,
        document_id: DocumentId,
        name: &str,
        bytes: &[u8],
    ) -> Result<ArtifactRef, Error>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: PartnerId,
    pub name: String,
    /// Company this contact belongs to.
    pub parent_id: Option<PartnerId>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Address book of the host.
pub trait ContactDirectory: Send + Sync {
    fn get(&self, id: PartnerId) -> Option<Contact>;
    /// Contacts belonging to the company `partner_id`.
    fn children_of(&self, partner_id: PartnerId) -> Vec<Contact>;
    fn update_contact(
        &self,
        id: PartnerId,
        email: &str,
        phone: Option<&str>,
    ) -> Result<(), Error>;
}
