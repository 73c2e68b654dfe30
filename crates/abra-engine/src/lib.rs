//! Runtime for the Abra conversational backend: configuration, the HTTP
//! transport seam, the conversational client and the image-to-text service.

pub mod client;
pub mod config;
pub mod image_pipeline;
pub mod ocr;
pub mod service;
pub mod sources;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use client::{MetaAiClient, ReplyStream};
pub use config::ClientConfig;
pub use ocr::{OcrConfig, TesseractCli, TextRecognizer};
pub use service::{MetaAiRefiner, Refiner, ServiceError, TextExtractionService, INVOICE_PROMPT};
pub use sources::SourceFetcher;
pub use transport::{CredentialScope, FormRequest, HttpReply, HttpTransport, LineStream, Transport};
