use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Session tokens are valid for 15 days from issuance.
pub const TOKEN_TTL: Duration = Duration::days(15);

/// JWT payload: `{userId, iat, exp}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_secret(state.config.jwt.secret.as_bytes())
    }
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: TOKEN_TTL,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + self.ttl;
        let claims = Claims {
            user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            warn!(error = %e, "jwt rejected");
            AppError::Unauthorized("Invalid or expired token".into())
        })?;
        debug!(user_id = %data.claims.user_id, "jwt verified");
        Ok(data.claims)
    }
}

/// Route guard: validates the bearer token and yields the user id.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let claims = keys.verify(token)?;
        Ok(AuthUser(claims.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    fn make_keys() -> JwtKeys {
        JwtKeys::from_ref(&AppState::fake())
    }

    #[test]
    fn issue_and_verify() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.user_id, user_id);
    }

    #[test]
    fn expiry_is_fifteen_days_out() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let token = keys.issue_at(Uuid::new_v4(), now).expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.exp - claims.iat, 15 * 24 * 60 * 60);
        assert_eq!(claims.iat, now.unix_timestamp() as usize);
    }

    #[test]
    fn payload_uses_user_id_key() {
        let claims = Claims {
            user_id: Uuid::nil(),
            iat: 1,
            exp: 2,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn verify_rejects_other_secret() {
        let token = make_keys().issue(Uuid::new_v4()).expect("issue");
        let other = JwtKeys::from_secret(b"another-secret");
        let err = other.verify(&token).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys();
        let issued = OffsetDateTime::now_utc() - Duration::days(16);
        let token = keys.issue_at(Uuid::new_v4(), issued).expect("issue");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_token_just_past_expiry() {
        let keys = make_keys();
        let issued = OffsetDateTime::now_utc() - TOKEN_TTL - Duration::seconds(30);
        let token = keys.issue_at(Uuid::new_v4(), issued).expect("issue");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        assert!(make_keys().verify("not.a.jwt").is_err());
    }

    async fn extract(req: Request<()>) -> Result<AuthUser, AppError> {
        let state = AppState::fake();
        let (mut parts, _) = req.into_parts();
        AuthUser::from_request_parts(&mut parts, &state).await
    }

    #[tokio::test]
    async fn extractor_accepts_bearer_token() {
        let user_id = Uuid::new_v4();
        let token = make_keys().issue(user_id).unwrap();
        let req = Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let AuthUser(id) = extract(req).await.expect("should authenticate");
        assert_eq!(id, user_id);
    }

    #[tokio::test]
    async fn extractor_rejects_missing_or_malformed_header() {
        let missing = extract(Request::builder().body(()).unwrap()).await;
        assert!(matches!(missing, Err(AppError::Unauthorized(_))));

        let basic = Request::builder()
            .header("authorization", "Basic abc")
            .body(())
            .unwrap();
        assert!(matches!(extract(basic).await, Err(AppError::Unauthorized(_))));
    }
}
