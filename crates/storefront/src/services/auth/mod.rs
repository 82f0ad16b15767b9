//! Authentication service.
//!
//! Password login, registration, password recovery and profile updates
//! against the store's auth endpoints. Every call that yields a credential
//! signs the shared [`Session`](crate::session::Session) in, which persists
//! `token`/`user` and wakes the cart container.

mod error;

pub use error::AuthError;

use reqwest::Method;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use shoplane_core::{Email, UserProfile};
use tracing::instrument;

use crate::api::{ApiClient, ApiError};
use crate::session::Identity;

/// Minimum password length accepted before asking the server.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Envelope shared by the auth endpoints.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    message: Option<String>,
}

impl AuthResponse {
    fn into_result(self) -> Result<Self, AuthError> {
        if self.success {
            Ok(self)
        } else {
            Err(AuthError::Rejected(self.message.unwrap_or_default()))
        }
    }

    fn into_identity(self) -> Option<Identity> {
        Some(Identity {
            token: SecretString::from(self.token?),
            user: self.user?,
        })
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct Registration<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    phone: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordReset<'a> {
    email: &'a str,
    otp: &'a str,
    new_password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate<'a> {
    name: &'a str,
    phone: &'a str,
    user_id: &'a str,
}

/// Authentication service.
pub struct AuthService<'a> {
    api: &'a ApiClient,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(api: &'a ApiClient) -> Self {
        Self { api }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Login with email and password, signing the session in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::InvalidCredentials` if the server rejects the pair.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let email = Email::parse(email)?;
        let response = self
            .post(
                "/api/auth/login",
                &Credentials {
                    email: email.as_str(),
                    password,
                },
            )
            .await
            .map_err(|e| match e {
                AuthError::Api(ApiError::Unauthorized) => AuthError::InvalidCredentials,
                other => other,
            })?;

        let identity = response.into_identity().ok_or(AuthError::MissingSession)?;
        self.sign_in(identity)
    }

    /// Register a new account.
    ///
    /// When the server also issues a credential the session is signed in and
    /// the new profile is returned; otherwise the customer must log in.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid or the server declines.
    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<UserProfile>, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingName);
        }
        let email = Email::parse(email)?;
        validate_password(password)?;

        let response = self
            .post(
                "/api/auth/register",
                &Registration {
                    name,
                    email: email.as_str(),
                    password,
                    phone: "",
                },
            )
            .await?;

        match response.into_identity() {
            Some(identity) => self.sign_in(identity).map(Some),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Password Recovery
    // =========================================================================

    /// Ask the server to email a one-time reset code.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` when the server knows no such account.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        #[derive(Serialize)]
        struct Body<'a> {
            email: &'a str,
        }

        let email = Email::parse(email)?;
        self.post(
            "/api/auth/forgot-password",
            &Body {
                email: email.as_str(),
            },
        )
        .await?;
        Ok(())
    }

    /// Set a new password using the emailed code. Signs the session in.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is wrong or the password too weak.
    #[instrument(skip(self, otp, new_password))]
    pub async fn reset_password(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<UserProfile, AuthError> {
        let email = Email::parse(email)?;
        validate_password(new_password)?;

        let response = self
            .post(
                "/api/auth/reset-password",
                &PasswordReset {
                    email: email.as_str(),
                    otp: otp.trim(),
                    new_password,
                },
            )
            .await?;

        let identity = response.into_identity().ok_or(AuthError::MissingSession)?;
        self.sign_in(identity)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Update the signed-in user's name and phone.
    ///
    /// The server's copy of the profile is merged over the local one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Api(ApiError::NotAuthenticated)` when signed out.
    #[instrument(skip(self))]
    pub async fn update_profile(&self, name: &str, phone: &str) -> Result<UserProfile, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::MissingName);
        }
        let session = self.api.session();
        let Some(current) = session.user() else {
            return Err(ApiError::NotAuthenticated.into());
        };

        let response: AuthResponse = self
            .api
            .authed_json(
                Method::PUT,
                "/api/users/update-profile",
                &ProfileUpdate {
                    name,
                    phone: phone.trim(),
                    user_id: current.id.as_str(),
                },
            )
            .await?;
        let response = response.into_result()?;

        let updated = response.user.unwrap_or_else(|| UserProfile {
            name: name.to_owned(),
            phone: Some(phone.trim().to_owned()).filter(|p| !p.is_empty()),
            ..current
        });
        session.update_user(updated.clone())?;
        Ok(updated)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, AuthError> {
        let url = self.api.url(path)?;
        let response: AuthResponse = self
            .api
            .send(self.api.request(Method::POST, url).json(body))
            .await?;
        response.into_result()
    }

    fn sign_in(&self, identity: Identity) -> Result<UserProfile, AuthError> {
        let user = identity.user.clone();
        self.api.session().sign_in(identity)?;
        tracing::info!(user_id = %user.id, "signed in");
        Ok(user)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use url::Url;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::cache::{LocalCache, MemoryCache, keys};
    use crate::session::Session;
    use crate::test_support::sample_identity;

    fn api(server: &MockServer) -> (ApiClient, Arc<dyn LocalCache>) {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let session = Session::restore(cache.clone());
        (
            ApiClient::new(Url::parse(&server.uri()).unwrap(), session),
            cache,
        )
    }

    fn user_json() -> serde_json::Value {
        serde_json::json!({"_id": "u1", "name": "Asha Rao", "email": "asha@shop.in"})
    }

    #[tokio::test]
    async fn test_login_signs_session_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(serde_json::json!({"email": "asha@shop.in", "password": "hunter22"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "token": "tok_123",
                "user": user_json()
            })))
            .mount(&server)
            .await;
        let (api, cache) = api(&server);

        let user = AuthService::new(&api)
            .login("asha@shop.in", "hunter22")
            .await
            .unwrap();

        assert_eq!(user.first_name(), "Asha");
        assert!(api.session().is_signed_in());
        assert!(cache.get_raw(keys::TOKEN).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_rejection_keeps_session_signed_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"success": false, "message": "Invalid password"})),
            )
            .mount(&server)
            .await;
        let (api, _) = api(&server);

        let err = AuthService::new(&api)
            .login("asha@shop.in", "wrong-pass")
            .await
            .unwrap_err();

        assert_eq!(err.user_message(), "Invalid password");
        assert!(!api.session().is_signed_in());
    }

    #[tokio::test]
    async fn test_register_without_token_stays_signed_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true
            })))
            .expect(1)
            .mount(&server)
            .await;
        let (api, _) = api(&server);
        let auth = AuthService::new(&api);

        assert!(matches!(
            auth.register("Asha", "asha@shop.in", "123").await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            auth.register(" ", "asha@shop.in", "hunter22").await,
            Err(AuthError::MissingName)
        ));
        let outcome = auth.register("Asha Rao", "asha@shop.in", "hunter22").await;
        assert!(outcome.unwrap().is_none());
        assert!(!api.session().is_signed_in());
    }

    #[tokio::test]
    async fn test_forgot_password_reports_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/forgot-password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "message": "User not found"
            })))
            .mount(&server)
            .await;
        let (api, _) = api(&server);

        let err = AuthService::new(&api)
            .forgot_password("ghost@shop.in")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Rejected(ref m) if m == "User not found"));
    }

    #[tokio::test]
    async fn test_reset_password_signs_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/reset-password"))
            .and(body_json(serde_json::json!({
                "email": "asha@shop.in",
                "otp": "482913",
                "newPassword": "fresh-pass"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "token": "tok_new",
                "user": user_json()
            })))
            .mount(&server)
            .await;
        let (api, _) = api(&server);

        AuthService::new(&api)
            .reset_password("asha@shop.in", "482913", "fresh-pass")
            .await
            .unwrap();
        assert!(api.session().is_signed_in());
    }

    #[tokio::test]
    async fn test_update_profile_merges_server_copy() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/users/update-profile"))
            .and(header("authorization", "Bearer tok_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "user": {"_id": "u1", "name": "Asha R", "email": "asha@shop.in", "phone": "9876543210"}
            })))
            .mount(&server)
            .await;
        let (api, _) = api(&server);
        let auth = AuthService::new(&api);

        assert!(matches!(
            auth.update_profile("Asha R", "").await,
            Err(AuthError::Api(ApiError::NotAuthenticated))
        ));

        api.session().sign_in(sample_identity()).unwrap();
        let updated = auth.update_profile("Asha R", "9876543210").await.unwrap();

        assert_eq!(updated.name, "Asha R");
        assert_eq!(api.session().user().unwrap().phone.as_deref(), Some("9876543210"));
    }
}
