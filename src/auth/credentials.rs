use serde::{Deserialize, Serialize};

use crate::backend::AuthService;
use crate::models::{Credentials, Identity};
use crate::ClientError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialMode {
    #[default]
    SignIn,
    SignUp,
}

impl CredentialMode {
    pub fn toggled(self) -> Self {
        match self {
            CredentialMode::SignIn => CredentialMode::SignUp,
            CredentialMode::SignUp => CredentialMode::SignIn,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CredentialMode::SignIn => "Sign In",
            CredentialMode::SignUp => "Sign Up",
        }
    }

    /// Text of the link that switches to the other mode.
    pub fn toggle_label(self) -> &'static str {
        match self {
            CredentialMode::SignIn => "No account? Sign Up",
            CredentialMode::SignUp => "Already have an account? Sign In",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialMode::SignIn => "sign_in",
            CredentialMode::SignUp => "sign_up",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CredentialOutcome {
    /// Account created. Some backends sign the user in at once.
    SignedUp(Option<Identity>),
    SignedIn(Identity),
}

/// Email/password form shown while nobody is signed in.
#[derive(Debug, Clone, Default)]
pub struct CredentialForm {
    pub mode: CredentialMode,
    pub email: String,
    pub error: Option<String>,
}

impl CredentialForm {
    pub fn new(mode: CredentialMode) -> Self {
        CredentialForm {
            mode,
            ..Default::default()
        }
    }

    pub fn toggle(&mut self) {
        self.mode = self.mode.toggled();
        self.error = None;
    }

    pub async fn submit(
        &mut self,
        auth: &dyn AuthService,
        email: &str,
        password: &str,
    ) -> Result<CredentialOutcome, ClientError> {
        self.email = email.to_owned();
        let result = self.send(auth, email, password).await;
        self.error = result.as_ref().err().map(ToString::to_string);
        result
    }

    async fn send(
        &mut self,
        auth: &dyn AuthService,
        email: &str,
        password: &str,
    ) -> Result<CredentialOutcome, ClientError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::validation("Email and password required"));
        }

        let credentials = Credentials {
            email: email.trim().to_owned(),
            password: password.to_owned(),
        };
        match self.mode {
            CredentialMode::SignUp => {
                let identity = auth.sign_up(&credentials).await?;
                tracing::info!(email = %credentials.email, "account created");
                self.mode = CredentialMode::SignIn;
                Ok(CredentialOutcome::SignedUp(identity))
            }
            CredentialMode::SignIn => {
                let identity = auth.sign_in(&credentials).await?;
                tracing::info!(user = %identity.id, "signed in");
                Ok(CredentialOutcome::SignedIn(identity))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;

    #[tokio::test]
    async fn missing_fields_send_nothing() {
        let backend = MemoryBackend::new();
        let client = backend.connect();
        let mut form = CredentialForm::new(CredentialMode::SignIn);

        let err = form.submit(client.as_ref(), "  ", "secret").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert_eq!(form.error.as_deref(), Some("Email and password required"));
        assert_eq!(form.mode, CredentialMode::SignIn);
    }

    #[tokio::test]
    async fn sign_up_switches_to_sign_in() {
        let backend = MemoryBackend::new();
        let client = backend.connect();
        let mut form = CredentialForm::new(CredentialMode::SignUp);

        let outcome = form
            .submit(client.as_ref(), "ann@example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(outcome, CredentialOutcome::SignedUp(None));
        assert_eq!(form.mode, CredentialMode::SignIn);
        assert!(form.error.is_none());

        let outcome = form
            .submit(client.as_ref(), "ann@example.com", "hunter22")
            .await
            .unwrap();
        assert!(matches!(outcome, CredentialOutcome::SignedIn(_)));
    }

    #[tokio::test]
    async fn backend_text_is_shown_verbatim() {
        let backend = MemoryBackend::new();
        let client = backend.connect();
        let mut form = CredentialForm::default();

        form.submit(client.as_ref(), "who@example.com", "wrongpass")
            .await
            .unwrap_err();
        assert_eq!(form.error.as_deref(), Some("Invalid login credentials"));
        assert_eq!(form.email, "who@example.com");
    }
}
