use async_trait::async_trait;
use uuid::Uuid;

use crate::payment::CollaboratorError;

/// Object-storage collaborator for vendor-uploaded documents (insurance
/// certificates, signed contracts). The engine stores only the returned
/// URL as an opaque string.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn store_document(
        &self,
        vendor_id: Uuid,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, CollaboratorError>;
}

pub struct MockDocumentStore;

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn store_document(
        &self,
        vendor_id: Uuid,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, CollaboratorError> {
        tracing::info!(%vendor_id, file_name, size = bytes.len(), "stored mock document");
        Ok(format!("https://docs.example.com/{}/{}", vendor_id.simple(), file_name))
    }
}
