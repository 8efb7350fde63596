use fhir::FhirError;
use prom_types::TextError;
use prom_uuid::UuidError;

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write bundle file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read bundle file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to serialize bundle: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize bundle: {0}")]
    Deserialization(serde_json::Error),
    #[error("store lock poisoned")]
    LockPoisoned,

    #[error("FHIR error: {0}")]
    Fhir(#[from] FhirError),
    #[error("identifier error: {0}")]
    Id(#[from] UuidError),
    #[error("invalid text: {0}")]
    Text(#[from] TextError),
}

pub type PatientResult<T> = std::result::Result<T, PatientError>;
