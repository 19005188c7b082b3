//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::AppState;
use crate::error::{Result, ServerError};
use crate::notification::Requester;
use crate::user::{Role, User, UserRepository};

const BEARER: &str = "Bearer ";

/// Authenticated caller, inserted as a request extension.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub company_id: Option<Uuid>,
}

impl AuthUser {
    /// Refuse callers without one of `roles`.
    pub fn require(&self, roles: &[Role]) -> Result<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(ServerError::Forbidden("You do not have access to this resource."))
        }
    }

    /// Company of an hr or admin caller.
    pub fn employer(&self) -> Result<Uuid> {
        self.require(&[Role::Admin, Role::Hr])?;
        self.company_id
            .ok_or(ServerError::Forbidden("Your account is not linked to a company."))
    }

    /// Access filter identity.
    pub fn requester(&self) -> Requester {
        Requester {
            id: self.id,
            company_id: self.company_id,
            role: self.role,
        }
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            company_id: user.company_ref(),
        }
    }
}

fn bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .map(|token| token.strip_prefix(BEARER).unwrap_or(token).trim())
        .filter(|token| !token.is_empty())
}

/// Custom middleware for authentification.
///
/// The database is checked first so an outage answers 503 rather than 401.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    if !state.db.is_available().await {
        return Err(ServerError::Unavailable);
    }

    let token = bearer(&req).ok_or(ServerError::Unauthorized)?;
    let claims = state
        .token
        .decode(token)
        .map_err(|_| ServerError::Unauthorized)?;
    let user_id =
        Uuid::parse_str(&claims.sub).map_err(|_| ServerError::Unauthorized)?;

    let user = match UserRepository::new(state.db.postgres.clone())
        .find_by_id(user_id)
        .await
    {
        Ok(user) => user,
        Err(ServerError::NotFound(_)) => return Err(ServerError::Unauthorized),
        Err(err) => return Err(err),
    };

    req.extensions_mut().insert(AuthUser::from(&user));
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
