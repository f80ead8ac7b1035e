//! In-memory host services, for embedding without an ERP and for tests.

use crate::document::{ArtifactRef, DocumentId, PartnerId, SaleDocument};
use crate::host::{
    AttachmentStore, AuditLog, Contact, ContactDirectory, DocumentRepository, TaskRequest,
    TaskScheduler,
};
use crate::Error;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, Error> {
    mutex
        .lock()
        .map_err(|_| Error::Host("in-memory store lock poisoned".to_owned()))
}

#[derive(Debug, Default)]
pub struct MemoryDocumentRepository {
    documents: Mutex<BTreeMap<DocumentId, SaleDocument>>,
}

impl MemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentRepository for MemoryDocumentRepository {
    fn load(&self, id: DocumentId) -> Result<SaleDocument, Error> {
        lock(&self.documents)?
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::Host(format!("document {} not found", id)))
    }

    fn save(&self, document: &SaleDocument) -> Result<(), Error> {
        lock(&self.documents)?.insert(document.id, document.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub request: TaskRequest,
    pub done: bool,
}

#[derive(Debug, Default)]
pub struct MemoryTaskScheduler {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl MemoryTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<ScheduledTask> {
        lock(&self.tasks).map(|tasks| tasks.clone()).unwrap_or_default()
    }
}

impl TaskScheduler for MemoryTaskScheduler {
    fn schedule(&self, task: TaskRequest) -> Result<(), Error> {
        lock(&self.tasks)?.push(ScheduledTask {
            request: task,
            done: false,
        });
        Ok(())
    }

    fn complete_matching(&self, document_id: DocumentId, summary: &str) -> Result<usize, Error> {
        let mut completed = 0;
        for task in lock(&self.tasks)?.iter_mut() {
            if !task.done
                && task.request.document_id == document_id
                && task.request.summary == summary
            {
                task.done = true;
                completed += 1;
            }
        }
        Ok(completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditNote {
    pub document_id: DocumentId,
    pub body: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    notes: Mutex<Vec<AuditNote>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes_for(&self, document_id: DocumentId) -> Vec<AuditNote> {
        lock(&self.notes)
            .map(|notes| {
                notes
                    .iter()
                    .filter(|note| note.document_id == document_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn append_note(&self, document_id: DocumentId, text: &str) -> Result<(), Error> {
        lock(&self.notes)?.push(AuditNote {
            document_id,
            body: text.to_owned(),
            at: Utc::now(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub document_id: DocumentId,
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryAttachmentStore {
    attachments: Mutex<Vec<StoredAttachment>>,
}

impl MemoryAttachmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, artifact: &ArtifactRef) -> Option<StoredAttachment> {
        let index: usize = artifact.0.strip_prefix("attachment-")?.parse().ok()?;
        lock(&self.attachments).ok()?.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.attachments).map(|a| a.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AttachmentStore for MemoryAttachmentStore {
    fn store(
        &self,
        document_id: DocumentId,
        name: &str,
        bytes: &[u8],
    ) -> Result<ArtifactRef, Error> {
        let mut attachments = lock(&self.attachments)?;
        attachments.push(StoredAttachment {
            document_id,
            name: name.to_owned(),
            bytes: bytes.to_vec(),
        });
        Ok(ArtifactRef(format!("attachment-{}", attachments.len() - 1)))
    }
}

#[derive(Debug, Default)]
pub struct MemoryContactDirectory {
    contacts: Mutex<HashMap<PartnerId, Contact>>,
}

impl MemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, contact: Contact) {
        if let Ok(mut contacts) = self.contacts.lock() {
            contacts.insert(contact.id, contact);
        }
    }
}

impl ContactDirectory for MemoryContactDirectory {
    fn get(&self, id: PartnerId) -> Option<Contact> {
        self.contacts.lock().ok()?.get(&id).cloned()
    }

    fn children_of(&self, partner_id: PartnerId) -> Vec<Contact> {
        let mut children: Vec<Contact> = match self.contacts.lock() {
            Ok(contacts) => contacts
                .values()
                .filter(|c| c.parent_id == Some(partner_id) && c.id != partner_id)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        };
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }

    fn update_contact(
        &self,
        id: PartnerId,
        email: &str,
        phone: Option<&str>,
    ) -> Result<(), Error> {
        let mut contacts = lock(&self.contacts)?;
        let contact = contacts
            .get_mut(&id)
            .ok_or_else(|| Error::Host(format!("contact {} not found", id)))?;
        contact.email = Some(email.to_owned());
        contact.phone = phone.map(str::to_owned);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::TaskKind;
    use chrono::NaiveDate;

    fn task(document_id: DocumentId, summary: &str) -> TaskRequest {
        TaskRequest {
            document_id,
            kind: TaskKind::Todo,
            summary: summary.to_owned(),
            note: String::new(),
            assignee: Some(3),
            due: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    #[test]
    fn complete_matching_only_touches_open_tasks_of_document() {
        let scheduler = MemoryTaskScheduler::new();
        scheduler.schedule(task(1, "Follow up")).unwrap();
        scheduler.schedule(task(2, "Follow up")).unwrap();
        scheduler.schedule(task(1, "Other")).unwrap();
        assert_eq!(scheduler.complete_matching(1, "Follow up").unwrap(), 1);
        assert_eq!(scheduler.complete_matching(1, "Follow up").unwrap(), 0);
        let done: Vec<bool> = scheduler.tasks().iter().map(|t| t.done).collect();
        assert_eq!(done, vec![true, false, false]);
    }

    #[test]
    fn attachments_can_be_read_back() {
        let store = MemoryAttachmentStore::new();
        let artifact = store.store(4, "S1_signed.pdf", b"%PDF").unwrap();
        let stored = store.get(&artifact).unwrap();
        assert_eq!(stored.name, "S1_signed.pdf");
        assert_eq!(stored.bytes, b"%PDF".to_vec());
        assert_eq!(store.get(&ArtifactRef("nope".to_owned())), None);
    }
}
