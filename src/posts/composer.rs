use uuid::Uuid;

use crate::backend::Services;
use crate::generate::{blog_prompt, TextGenerator};
use crate::models::{unix_millis, NewPost, Upload};
use crate::ClientError;

pub const POST_IMAGES_BUCKET: &str = "post-images";

const TITLE_FIRST: &str = "Please enter a title first.";
const GENERATION_FAILED: &str = "Failed to generate content. Please try again.";
const FIELDS_REQUIRED: &str = "Title and content required";

pub fn post_image_path(millis: i128, owner: Uuid, image: &Upload) -> String {
    format!("posts/{millis}-{owner}.{}", image.extension())
}

/// The "Create a Post" form.
#[derive(Debug, Clone, Default)]
pub struct PostComposer {
    pub title: String,
    pub content: String,
    pub error: Option<String>,
}

impl PostComposer {
    /// Drafts the body from the title. Failures keep the form as it was.
    pub async fn generate(&mut self, generator: &dyn TextGenerator) -> Result<(), ClientError> {
        if self.title.trim().is_empty() {
            return self.fail(ClientError::validation(TITLE_FIRST));
        }

        self.error = None;
        match generator.generate(&blog_prompt(&self.title)).await {
            Ok(text) => {
                self.content = text;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("content generation failed: {e}");
                self.fail(ClientError::Generation(GENERATION_FAILED))
            }
        }
    }

    /// Uploads the image if any, then inserts the post. Clears the form on
    /// success.
    pub async fn submit(
        &mut self,
        services: &Services,
        owner: Uuid,
        image: Option<Upload>,
    ) -> Result<(), ClientError> {
        self.error = None;
        if self.title.is_empty() || self.content.is_empty() {
            return self.fail(ClientError::validation(FIELDS_REQUIRED));
        }

        let image_url = match image {
            Some(image) => {
                let path = post_image_path(unix_millis(), owner, &image);
                if let Err(e) = services.storage.upload(POST_IMAGES_BUCKET, &path, &image).await {
                    tracing::warn!(%path, "post image upload failed: {e}");
                    return self.fail(ClientError::Upload(e));
                }
                Some(services.storage.public_url(POST_IMAGES_BUCKET, &path))
            }
            None => None,
        };

        let post = NewPost {
            title: self.title.clone(),
            content: self.content.clone(),
            image_url,
            user_id: owner,
        };
        if let Err(e) = services.store.insert_post(&post).await {
            return self.fail(e.into());
        }

        tracing::info!(user = %owner, title = %post.title, "post created");
        *self = PostComposer::default();
        Ok(())
    }

    fn fail(&mut self, error: ClientError) -> Result<(), ClientError> {
        self.error = Some(error.to_string());
        Err(error)
    }
}
