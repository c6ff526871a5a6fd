use crate::backend::Services;
use crate::models::{unix_millis, Identity, Profile, Upload};
use crate::ClientError;

pub const AVATAR_BUCKET: &str = "avatars";

pub fn avatar_path(millis: i128, file_name: &str) -> String {
    format!("public/{millis}-{file_name}")
}

/// Profile setup overlay. `error` holds the text shown after a failed save.
#[derive(Debug, Clone, Default)]
pub struct ProfileEditor {
    pub username: String,
    pub error: Option<String>,
    saving: bool,
}

impl ProfileEditor {
    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Uploads the avatar if one was picked, then upserts the profile row
    /// with the completion flag set. Any failure aborts the whole save.
    pub async fn save(
        &mut self,
        services: &Services,
        identity: &Identity,
        username: &str,
        image: Option<Upload>,
    ) -> Result<Profile, ClientError> {
        self.username = username.to_owned();
        self.saving = true;
        let result = self.upsert(services, identity, image).await;
        self.saving = false;

        match &result {
            Ok(_) => self.error = None,
            Err(e) => {
                tracing::warn!(user = %identity.id, "profile save failed: {e}");
                self.error = Some(format!("Something went wrong: {e}"));
            }
        }
        result
    }

    async fn upsert(
        &self,
        services: &Services,
        identity: &Identity,
        image: Option<Upload>,
    ) -> Result<Profile, ClientError> {
        let avatar_url = match image {
            Some(image) => {
                let path = avatar_path(unix_millis(), &image.file_name);
                services.storage.upload(AVATAR_BUCKET, &path, &image).await?;
                Some(services.storage.public_url(AVATAR_BUCKET, &path))
            }
            None => None,
        };

        let profile = Profile {
            id: identity.id,
            username: Some(self.username.trim().to_owned()),
            avatar_url,
            is_modal: true,
        };
        services.store.upsert_profile(&profile).await?;
        tracing::info!(user = %identity.id, "profile saved");
        Ok(profile)
    }
}
