use async_trait::async_trait;

use crate::backend::{BackendResult, ObjectStorage};
use crate::models::Upload;

use super::{SupabaseClient, check};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[async_trait]
impl ObjectStorage for SupabaseClient {
    async fn upload(&self, bucket: &str, path: &str, file: &Upload) -> BackendResult<()> {
        let token = self.access_token().await?;
        let url = self.endpoint(["storage", "v1", "object", bucket].into_iter().chain(path.split('/')));
        let request = self
            .http
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                file.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
            )
            .body(file.bytes.clone());

        check(self.with_key(request, &token).send().await?).await?;
        tracing::debug!(bucket, path, size = file.bytes.len(), "uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.endpoint(
            ["storage", "v1", "object", "public", bucket]
                .into_iter()
                .chain(path.split('/')),
        )
        .to_string()
    }
}
