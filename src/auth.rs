//! Per-request caller identity and the capability checks handlers run against it.

use std::collections::HashSet;

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use uuid::Uuid;

use crate::database::Store;
use crate::error::AppError;
use crate::models::UserRole;

/// Header carrying the authenticated user id, set by the identity gateway.
pub const ACTOR_HEADER: &str = "X-Actor-Id";

/// Something a caller may try to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    WriteReview,
    CreateBusiness,
    ManageBusiness(Uuid),
    /// Carries the review author's id.
    ManageReview(Uuid),
    Moderate,
}

/// Who is calling, resolved once per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationContext {
    Anonymous,
    User {
        user_id: Uuid,
    },
    BusinessOwner {
        user_id: Uuid,
        business_ids: HashSet<Uuid>,
    },
    Admin {
        user_id: Uuid,
    },
}

impl AuthorizationContext {
    pub async fn resolve(store: &dyn Store, user_id: Uuid) -> Result<Self, AppError> {
        let profile = store
            .get_profile(user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let context = match profile.role {
            UserRole::User => Self::User { user_id },
            UserRole::Admin => Self::Admin { user_id },
            UserRole::BusinessOwner => Self::BusinessOwner {
                user_id,
                business_ids: store.owned_business_ids(user_id).await?.into_iter().collect(),
            },
        };
        Ok(context)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Anonymous => None,
            Self::User { user_id }
            | Self::BusinessOwner { user_id, .. }
            | Self::Admin { user_id } => Some(*user_id),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    pub fn owns(&self, business_id: Uuid) -> bool {
        match self {
            Self::BusinessOwner { business_ids, .. } => business_ids.contains(&business_id),
            _ => false,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match (self, capability) {
            (Self::Admin { .. }, _) => true,
            (Self::Anonymous, _) => false,
            (_, Capability::WriteReview) => true,
            (Self::BusinessOwner { .. }, Capability::CreateBusiness) => true,
            (_, Capability::ManageBusiness(business_id)) => self.owns(business_id),
            (_, Capability::ManageReview(author_id)) => self.user_id() == Some(author_id),
            _ => false,
        }
    }

    /// Anonymous callers get 401, authenticated ones lacking the capability 403.
    pub fn require(&self, capability: Capability) -> Result<(), AppError> {
        if self.allows(capability) {
            return Ok(());
        }
        match self {
            Self::Anonymous => Err(AppError::Unauthorized),
            _ => Err(AppError::Forbidden),
        }
    }
}

impl FromRequest for AuthorizationContext {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let header = req
            .headers()
            .get(ACTOR_HEADER)
            .map(|h| h.to_str().map(|s| s.trim().to_string()));
        let store = req.app_data::<web::Data<dyn Store>>().cloned();

        Box::pin(async move {
            let raw = match header {
                None => return Ok(Self::Anonymous),
                Some(Ok(raw)) => raw,
                Some(Err(_)) => return Err(AppError::Unauthorized),
            };
            let user_id = Uuid::parse_str(&raw).map_err(|_| AppError::Unauthorized)?;
            let store = store.ok_or(AppError::Internal("store is not registered"))?;
            Self::resolve(store.get_ref(), user_id).await
        })
    }
}
