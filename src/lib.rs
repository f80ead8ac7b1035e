//! Send sales quotations for e-signature and follow the signing transaction
//! until the countersigned PDF is back on the document.

pub mod config;
pub mod document;
mod error;
pub mod host;
pub mod memory;
pub mod orchestrator;
pub mod page_resolver;
mod pdf_object;
mod signer_info;
pub mod template;
pub mod transaction;
pub mod wizard;

pub use config::{get_credentials, ConfigSource, Credentials, EnvConfig, MemoryConfig};
pub use document::{ArtifactRef, SaleDocument, SignatureTransaction, TransactionStatus};
pub use error::Error;
pub use orchestrator::{
    HostServices, SigningOrchestrator, SigningOutcome, TransactionResult, WizardPrompt,
};
pub use page_resolver::resolve_signing_page;
pub use signer_info::{split_name, SignerInfo};
pub use template::{PageType, SignatureTemplate, SignatureType, TemplateRegistry};
pub use transaction::{HttpTransactionClient, ProviderStatus, SigningApi};
pub use wizard::SignerWizard;

pub use lopdf;
