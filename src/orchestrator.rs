//! Lifecycle of the signing transaction of one sales document.
//!
//! `initiate_signing` renders the quotation, uploads it and launches the
//! transaction; `check_status` polls the provider and fetches the signed copy
//! once. Both hold a per-document lock for their whole run, so the signed copy
//! is downloaded and attached at most once per document.

use crate::config::{self, ConfigSource};
use crate::document::{DocumentId, PartnerId, SaleDocument, TransactionStatus, UserId};
use crate::host::{
    AttachmentStore, AuditLog, DocumentRenderer, DocumentRepository, TaskKind, TaskRequest,
    TaskScheduler,
};
use crate::page_resolver;
use crate::template::{SignatureTemplate, TemplateId, TemplateRegistry};
use crate::transaction::{LaunchRequest, OtpMode, ProviderStatus, SigningApi};
use crate::{Error, SignerInfo};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const FOLLOW_UP_SUMMARY: &str = "Follow up on signature";
pub const REVIEW_SUMMARY: &str = "Review signed document";
pub const WIZARD_TITLE: &str = "Select Signer and Signature Template";

/// Ask the caller to pick a signer and a template first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardPrompt {
    pub title: String,
    pub document_id: DocumentId,
    /// Customer whose contacts may sign.
    pub partner_id: PartnerId,
    pub default_template_id: Option<TemplateId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub transaction_id: String,
    pub signature_url: Option<String>,
    pub page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningOutcome {
    Prompt(WizardPrompt),
    Sent(TransactionResult),
}

/// The host services used by the orchestrator.
#[derive(Clone)]
pub struct HostServices {
    pub renderer: Arc<dyn DocumentRenderer>,
    pub documents: Arc<dyn DocumentRepository>,
    pub tasks: Arc<dyn TaskScheduler>,
    pub audit: Arc<dyn AuditLog>,
    pub attachments: Arc<dyn AttachmentStore>,
}

/// One mutex per document with a run in progress. Entries are dropped as soon
/// as no run holds or waits for them.
#[derive(Debug, Default)]
struct DocumentLocks {
    locks: Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    /// Run `f` while holding the lock of `document_id`.
    fn run<T>(
        &self,
        document_id: DocumentId,
        f: impl FnOnce() -> Result<T, Error>,
    ) -> Result<T, Error> {
        let entry = LockEntry {
            owner: self,
            document_id,
            lock: self.table().entry(document_id).or_default().clone(),
        };
        // The lock guards no data, a panic in an earlier run leaves nothing to repair.
        let _guard = entry.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<DocumentId, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

struct LockEntry<'a> {
    owner: &'a DocumentLocks,
    document_id: DocumentId,
    lock: Arc<Mutex<()>>,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut table = self.owner.table();
        // One reference in the table, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.document_id);
        }
    }
}

pub struct SigningOrchestrator {
    config: Arc<dyn ConfigSource>,
    templates: Arc<TemplateRegistry>,
    api: Arc<dyn SigningApi>,
    host: HostServices,
    /// User running the process, assignee when a document has no owner.
    acting_user: Option<UserId>,
    locks: DocumentLocks,
}

impl SigningOrchestrator {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        templates: Arc<TemplateRegistry>,
        api: Arc<dyn SigningApi>,
        host: HostServices,
    ) -> Self {
        SigningOrchestrator {
            config,
            templates,
            api,
            host,
            acting_user: None,
            locks: DocumentLocks::default(),
        }
    }

    pub fn with_acting_user(mut self, user_id: UserId) -> Self {
        self.acting_user = Some(user_id);
        self
    }

    /// Send a document for signature.
    ///
    /// Without `signer` nothing is sent: a [`WizardPrompt`] is returned so the
    /// caller can collect the signer and the template.
    pub fn initiate_signing(
        &self,
        document_id: DocumentId,
        signer: Option<SignerInfo>,
        template_id: Option<TemplateId>,
    ) -> Result<SigningOutcome, Error> {
        self.locks.run(document_id, || {
            self.initiate_locked(document_id, signer, template_id)
        })
    }

    /// Poll the provider and fetch the signed copy once it is signed.
    ///
    /// Returns `true` when a signed copy is attached to the document. Poll
    /// failures are logged and reported as "not yet": call again later.
    pub fn check_status(&self, document_id: DocumentId) -> Result<bool, Error> {
        self.locks
            .run(document_id, || self.check_status_locked(document_id))
    }

    fn initiate_locked(
        &self,
        document_id: DocumentId,
        signer: Option<SignerInfo>,
        template_id: Option<TemplateId>,
    ) -> Result<SigningOutcome, Error> {
        let mut document = self.host.documents.load(document_id)?;
        let signer = match signer {
            Some(signer) => signer,
            None => {
                let default_template_id = self
                    .templates
                    .get_default(document.company_id, self.config.as_ref())
                    .map(|template| template.id);
                return Ok(SigningOutcome::Prompt(WizardPrompt {
                    title: WIZARD_TITLE.to_owned(),
                    document_id,
                    partner_id: document.partner_id,
                    default_template_id,
                }));
            }
        };

        if signer.email.trim().is_empty() {
            return Err(Error::Validation(
                "Signer email is required to send the document for signature.".to_owned(),
            ));
        }
        if signer.name.trim().is_empty() {
            return Err(Error::Validation(
                "Signer name is required to send the document for signature.".to_owned(),
            ));
        }
        if document.signature.transaction_id().is_some() {
            return Err(Error::Validation(format!(
                "Document {} was already sent for signature.",
                document.name
            )));
        }
        let template = self.resolve_template(&document, template_id)?;

        match self.send(&mut document, &signer, &template) {
            Ok(result) => Ok(SigningOutcome::Sent(result)),
            Err(err) => {
                log::error!("Sending {} for signature failed: {}", document.name, err);
                self.note_quietly(
                    document_id,
                    &format!("Failed to send document for signature.\n\n{}", err),
                );
                Err(err)
            }
        }
    }

    fn check_status_locked(&self, document_id: DocumentId) -> Result<bool, Error> {
        let mut document = self.host.documents.load(document_id)?;
        let transaction_id = match document.signature.transaction_id() {
            Some(transaction_id) => transaction_id.to_owned(),
            None => return Ok(false),
        };
        if document.signature.signed_document_ref().is_some() {
            return Ok(true);
        }
        if matches!(
            document.signature.status(),
            TransactionStatus::Expired | TransactionStatus::Cancelled
        ) {
            return Ok(false);
        }

        let base_url = config::get_credentials(self.config.as_ref())?.base_url;
        let mut pdf_identifier = document.signature.document_identifier().map(str::to_owned);

        // A signed document whose download failed earlier skips straight to the download.
        if document.signature.status() != TransactionStatus::Signed {
            let (status, pdfs) = match self.api.poll_status(&base_url, &transaction_id) {
                Ok(ProviderStatus::Available { status, pdfs, .. }) => (status, pdfs),
                Ok(ProviderStatus::Unavailable { error_code }) => {
                    log::warn!(
                        "Status of transaction {} unavailable, error code {}",
                        transaction_id,
                        error_code
                    );
                    return Ok(false);
                }
                Err(err) => {
                    log::warn!(
                        "Could not poll status of transaction {}. Err: {}",
                        transaction_id,
                        err
                    );
                    return Ok(false);
                }
            };
            if let Some(pdf) = pdfs.into_iter().next() {
                pdf_identifier = Some(pdf.identifier);
            }
            if document.signature.advance(status)? {
                log::info!("Transaction {} is now {}", transaction_id, status);
                self.host.documents.save(&document)?;
                match status {
                    TransactionStatus::Expired => self.note_quietly(
                        document_id,
                        "The signature request expired before it was signed.",
                    ),
                    TransactionStatus::Cancelled => {
                        self.note_quietly(document_id, "The signature request was cancelled.")
                    }
                    _ => {}
                }
            }
            if status != TransactionStatus::Signed {
                return Ok(false);
            }
        }

        let pdf_identifier = pdf_identifier.ok_or_else(|| {
            Error::UnexpectedResponse(format!(
                "transaction {} lists no signed document",
                transaction_id
            ))
        })?;
        let signed_pdf =
            self.api
                .download_signed_document(&base_url, &transaction_id, &pdf_identifier)?;
        if signed_pdf.is_empty() {
            return Err(Error::UnexpectedResponse(
                "the signed document is empty".to_owned(),
            ));
        }
        let artifact = self.host.attachments.store(
            document_id,
            &document.signed_file_name(),
            &signed_pdf,
        )?;
        document.signature.attach_signed_document(artifact)?;
        self.host.documents.save(&document)?;
        log::info!("Signed copy of {} attached", document.name);

        // The signed copy is persisted from here on, bookkeeping failures are only logged.
        self.note_quietly(
            document_id,
            "The document has been signed. The signed copy is attached.",
        );
        if let Err(err) = self
            .host
            .tasks
            .complete_matching(document_id, FOLLOW_UP_SUMMARY)
        {
            log::error!(
                "Could not close follow-up tasks of {}. Err: {}",
                document.name,
                err
            );
        }
        self.schedule_quietly(TaskRequest {
            document_id,
            kind: TaskKind::Todo,
            summary: REVIEW_SUMMARY.to_owned(),
            note: format!(
                "The document \"{}\" has been signed. Please review the signed copy.",
                document.name
            ),
            assignee: document.owner_id.or(self.acting_user),
            due: Utc::now().date_naive(),
        });
        Ok(true)
    }

    fn resolve_template(
        &self,
        document: &SaleDocument,
        template_id: Option<TemplateId>,
    ) -> Result<SignatureTemplate, Error> {
        match template_id {
            Some(id) => self
                .templates
                .get(id)
                .filter(|template| template.active)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "The selected signature template (ID: {}) could not be found.",
                        id
                    ))
                }),
            None => self
                .templates
                .get_default(document.company_id, self.config.as_ref())
                .ok_or(Error::NoTemplateAvailable),
        }
    }

    fn send(
        &self,
        document: &mut SaleDocument,
        signer: &SignerInfo,
        template: &SignatureTemplate,
    ) -> Result<TransactionResult, Error> {
        let credentials = config::get_credentials(self.config.as_ref())?;
        let pdf = self.render(document)?;
        let page = page_resolver::resolve_signing_page(&pdf, template)?;

        let upload = self
            .api
            .upload_document(&credentials, &document.pdf_file_name(), &pdf)?;
        let message = format!("Signature request for your quotation {}", document.name);
        let launched = self.api.launch_signature(
            &credentials,
            &LaunchRequest {
                upload: &upload,
                signer,
                page,
                x: template.x,
                y: template.y,
                signature_type: template.signature_type,
                otp: OtpMode::None,
                message: &message,
            },
        )?;

        document.signature.mark_sent(
            &launched.transaction_id,
            &upload.document_identifier,
            launched.signature_url.clone(),
        )?;
        self.host.documents.save(document)?;
        log::info!(
            "{} sent for signature as transaction {}",
            document.name,
            launched.transaction_id
        );

        // The transaction is live and recorded, the rest must not report a failed send.
        self.note_quietly(
            document.id,
            &format!(
                "Document sent to {} ({}) for signature.",
                signer.name, signer.email
            ),
        );
        self.schedule_quietly(TaskRequest {
            document_id: document.id,
            kind: TaskKind::Todo,
            summary: FOLLOW_UP_SUMMARY.to_owned(),
            note: format!(
                "The document \"{}\" has been sent to {} for signature. You can follow the process on the signing platform.",
                document.name, signer.email
            ),
            assignee: document.owner_id.or(self.acting_user),
            due: Utc::now().date_naive(),
        });

        Ok(TransactionResult {
            transaction_id: launched.transaction_id,
            signature_url: launched.signature_url,
            page,
        })
    }

    fn render(&self, document: &SaleDocument) -> Result<Vec<u8>, Error> {
        let pdf = self.host.renderer.render(document.id).map_err(|err| match err {
            failure @ Error::RenderingFailure(_) => failure,
            other => Error::RenderingFailure(other.to_string()),
        })?;
        if pdf.is_empty() {
            return Err(Error::RenderingFailure(
                "the report returned an empty document".to_owned(),
            ));
        }
        Ok(pdf)
    }

    fn note_quietly(&self, document_id: DocumentId, text: &str) {
        if let Err(err) = self.host.audit.append_note(document_id, text) {
            log::error!("Could not write note on document {}. Err: {}", document_id, err);
        }
    }

    fn schedule_quietly(&self, task: TaskRequest) {
        let document_id = task.document_id;
        if let Err(err) = self.host.tasks.schedule(task) {
            log::error!("Could not schedule task on document {}. Err: {}", document_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn lock_entries_are_dropped_after_the_run() {
        let locks = DocumentLocks::default();
        assert_eq!(locks.run(7, || Ok(42)).unwrap(), 42);
        assert!(locks.run(7, || Err::<(), _>(Error::NoTemplateAvailable)).is_err());
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn each_document_gets_its_own_entry() {
        let locks = DocumentLocks::default();
        locks
            .run(1, || {
                // nested runs on other documents get their own entry
                locks.run(2, || {
                    assert_eq!(locks.len(), 2);
                    Ok(())
                })
            })
            .unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn panicking_run_does_not_block_the_document() {
        let locks = DocumentLocks::default();
        thread::scope(|scope| {
            let handle = scope.spawn(|| {
                let _ = locks.run(3, || -> Result<(), Error> { panic!("renderer crashed") });
            });
            assert!(handle.join().is_err());
        });
        assert_eq!(locks.len(), 0);
        assert_eq!(locks.run(3, || Ok("sent")).unwrap(), "sent");
    }
}
