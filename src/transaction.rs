//! Client of the signing provider's HTTP API.
//!
//! A transaction goes `New -> Uploaded -> Launched` on our side; the provider
//! then moves it to signed, expired or cancelled. Upload and launch are two
//! calls so a failed launch can be retried without sending the PDF again.
//! Nothing in here retries on its own.

use crate::config::Credentials;
use crate::document::TransactionStatus;
use crate::template::SignatureType;
use crate::{Error, SignerInfo};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(30);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// One-time password requirement for the signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OtpMode {
    #[default]
    None,
    Sms,
}

/// Result of a successful upload: the transaction now exists at the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub transaction_id: String,
    pub document_identifier: String,
}

/// Everything needed to launch an uploaded transaction.
#[derive(Debug, Clone)]
pub struct LaunchRequest<'a> {
    pub upload: &'a UploadedDocument,
    pub signer: &'a SignerInfo,
    pub page: u32,
    pub x: i64,
    pub y: i64,
    pub signature_type: SignatureType,
    pub otp: OtpMode,
    pub message: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedTransaction {
    pub transaction_id: String,
    /// Not every launch response carries a URL.
    pub signature_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPdf {
    pub identifier: String,
    pub name: Option<String>,
}

/// Normalized answer of a status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Available {
        /// Raw status as sent by the provider.
        raw_status: String,
        status: TransactionStatus,
        pdfs: Vec<ProviderPdf>,
    },
    /// The provider reported an error code; keep the last known status.
    Unavailable { error_code: i64 },
}

/// Operations of the signing provider.
pub trait SigningApi: Send + Sync {
    fn upload_document(
        &self,
        credentials: &Credentials,
        file_name: &str,
        pdf: &[u8],
    ) -> Result<UploadedDocument, Error>;

    fn launch_signature(
        &self,
        credentials: &Credentials,
        request: &LaunchRequest<'_>,
    ) -> Result<LaunchedTransaction, Error>;

    /// Public endpoint, no token required.
    fn poll_status(&self, base_url: &str, transaction_id: &str) -> Result<ProviderStatus, Error>;

    /// Public endpoint, no token required.
    fn download_signed_document(
        &self,
        base_url: &str,
        transaction_id: &str,
        document_identifier: &str,
    ) -> Result<Vec<u8>, Error>;
}

// Wire format

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadItem<'a> {
    file_name: &'a str,
    file_extension: &'a str,
    file_base64: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(rename = "errorCode", default)]
    error_code: Option<i64>,
    object: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UploadObject {
    uuid: String,
    #[serde(default)]
    pdfs: Vec<PdfEntry>,
}

#[derive(Debug, Deserialize)]
struct PdfEntry {
    identifier: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LaunchBody<'a> {
    sig_conf: Vec<SigConf<'a>>,
    message: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SigConf<'a> {
    signer: SignerBody<'a>,
    sig_type: SignatureType,
    docs_configs: Vec<DocConfig<'a>>,
    mode: &'static str,
    otp: OtpMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignerBody<'a> {
    first_name: String,
    last_name: String,
    email: &'a str,
    phone_number: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocConfig<'a> {
    page: u32,
    x_axis: i64,
    y_axis: i64,
    identifier: &'a str,
}

#[derive(Debug, Deserialize)]
struct LaunchObject {
    #[serde(default)]
    signers: Vec<LaunchedSigner>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchedSigner {
    #[serde(default)]
    signature_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusObject {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    pdfs: Vec<PdfEntry>,
}

/// Mode is always by mail: the signer gets an emailed invitation.
const SIGNING_MODE: &str = "BY_MAIL";

/// [`SigningApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransactionClient {
    client: Client,
}

impl HttpTransactionClient {
    pub fn new() -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(concat!("quotation_signing/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpTransactionClient { client })
    }

    pub fn with_client(client: Client) -> Self {
        HttpTransactionClient { client }
    }

    fn send(request: RequestBuilder) -> Result<Response, Error> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let raw_body = response.text().unwrap_or_default();
        Err(Error::Provider {
            status: status.as_u16(),
            body: pretty_body(&raw_body),
        })
    }

    fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, Error> {
        let bytes = response.bytes()?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pretty-print a JSON error body, or keep it as is.
fn pretty_body(raw_body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw_body)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| raw_body.to_owned())
}

impl SigningApi for HttpTransactionClient {
    fn upload_document(
        &self,
        credentials: &Credentials,
        file_name: &str,
        pdf: &[u8],
    ) -> Result<UploadedDocument, Error> {
        let url = format!("{}/pdfs", credentials.base_url);
        log::debug!("Uploading `{}` to {}", file_name, url);
        let batch = [UploadItem {
            file_name,
            file_extension: "pdf",
            file_base64: base64::encode(pdf),
        }];
        let response = Self::send(
            self.client
                .post(&url)
                .bearer_auth(&credentials.bearer_token)
                .json(&batch)
                .timeout(UPLOAD_TIMEOUT),
        )?;
        let envelope: Envelope<UploadObject> = Self::read_json(response)?;
        let object = envelope
            .object
            .ok_or_else(|| Error::UnexpectedResponse("upload response has no `object`".to_owned()))?;
        let document_identifier = object
            .pdfs
            .into_iter()
            .next()
            .map(|pdf| pdf.identifier)
            .ok_or_else(|| {
                Error::UnexpectedResponse("upload response lists no pdfs".to_owned())
            })?;
        log::info!("Uploaded `{}` as transaction {}", file_name, object.uuid);
        Ok(UploadedDocument {
            transaction_id: object.uuid,
            document_identifier,
        })
    }

    fn launch_signature(
        &self,
        credentials: &Credentials,
        request: &LaunchRequest<'_>,
    ) -> Result<LaunchedTransaction, Error> {
        let transaction_id = &request.upload.transaction_id;
        let url = format!("{}/{}/launch", credentials.base_url, transaction_id);
        log::debug!("Launching transaction at {}", url);
        let (first_name, last_name) = request.signer.split_name();
        let body = LaunchBody {
            sig_conf: vec![SigConf {
                signer: SignerBody {
                    first_name,
                    last_name,
                    email: &request.signer.email,
                    phone_number: request.signer.phone.as_deref().unwrap_or_default(),
                },
                sig_type: request.signature_type,
                docs_configs: vec![DocConfig {
                    page: request.page,
                    x_axis: request.x,
                    y_axis: request.y,
                    identifier: &request.upload.document_identifier,
                }],
                mode: SIGNING_MODE,
                otp: request.otp,
            }],
            message: request.message,
        };
        let response = Self::send(
            self.client
                .post(&url)
                .bearer_auth(&credentials.bearer_token)
                .json(&body)
                .timeout(LAUNCH_TIMEOUT),
        )?;
        let envelope: Envelope<LaunchObject> = Self::read_json(response)?;
        // The provider names the field `signatureUrl` or `url` depending on the version.
        let signature_url = envelope
            .object
            .and_then(|object| object.signers.into_iter().next())
            .and_then(|signer| signer.signature_url.or(signer.url));
        log::info!("Launched transaction {}", transaction_id);
        Ok(LaunchedTransaction {
            transaction_id: transaction_id.clone(),
            signature_url,
        })
    }

    fn poll_status(&self, base_url: &str, transaction_id: &str) -> Result<ProviderStatus, Error> {
        let url = format!("{}/{}", base_url, transaction_id);
        log::debug!("Polling status at {}", url);
        let response = Self::send(self.client.get(&url).timeout(STATUS_TIMEOUT))?;
        let envelope: Envelope<StatusObject> = Self::read_json(response)?;
        if let Some(error_code) = envelope.error_code.filter(|code| *code != 0) {
            return Ok(ProviderStatus::Unavailable { error_code });
        }
        let object = envelope
            .object
            .ok_or_else(|| Error::UnexpectedResponse("status response has no `object`".to_owned()))?;
        let raw_status = object.status.unwrap_or_default();
        Ok(ProviderStatus::Available {
            status: TransactionStatus::from_provider(&raw_status),
            raw_status,
            pdfs: object
                .pdfs
                .into_iter()
                .map(|pdf| ProviderPdf {
                    identifier: pdf.identifier,
                    name: pdf.name,
                })
                .collect(),
        })
    }

    fn download_signed_document(
        &self,
        base_url: &str,
        transaction_id: &str,
        document_identifier: &str,
    ) -> Result<Vec<u8>, Error> {
        let url = format!(
            "{}/{}/pdfs/{}",
            base_url, transaction_id, document_identifier
        );
        log::debug!("Downloading signed document from {}", url);
        let response = Self::send(self.client.get(&url).timeout(DOWNLOAD_TIMEOUT))?;
        Ok(response.bytes()?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_is_pretty_printed_when_json() {
        assert_eq!(
            pretty_body(r#"{"message":"Unauthorized"}"#),
            "{\n  \"message\": \"Unauthorized\"\n}"
        );
        assert_eq!(pretty_body("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn launch_body_matches_provider_contract() {
        let signer = SignerInfo::new("Jane Doe", "jane@example.com");
        let body = LaunchBody {
            sig_conf: vec![SigConf {
                signer: SignerBody {
                    first_name: "Jane".to_owned(),
                    last_name: "Doe".to_owned(),
                    email: &signer.email,
                    phone_number: "",
                },
                sig_type: SignatureType::DigiGo,
                docs_configs: vec![DocConfig {
                    page: 2,
                    x_axis: 100,
                    y_axis: 150,
                    identifier: "P1",
                }],
                mode: SIGNING_MODE,
                otp: OtpMode::None,
            }],
            message: "hello",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sigConf": [{
                    "signer": {
                        "firstName": "Jane",
                        "lastName": "Doe",
                        "email": "jane@example.com",
                        "phoneNumber": ""
                    },
                    "sigType": "DIGI_GO",
                    "docsConfigs": [{"page": 2, "xAxis": 100, "yAxis": 150, "identifier": "P1"}],
                    "mode": "BY_MAIL",
                    "otp": "NONE"
                }],
                "message": "hello"
            })
        );
    }

    #[test]
    fn status_envelope_reads_error_code() {
        let envelope: Envelope<StatusObject> =
            serde_json::from_str(r#"{"errorCode": 12, "object": null}"#).unwrap();
        assert_eq!(envelope.error_code, Some(12));
        assert!(envelope.object.is_none());
    }
}
