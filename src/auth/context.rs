//! Request-scoped identity produced by the resolver.

use serde::{Deserialize, Serialize};

use crate::types::{EndCustomerRef, LinkTokenRef, OrganizationRef, SessionRef, UserRef};

/// Which credential scheme authenticated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Session,
    ApiKey,
    LinkToken,
}

/// Who is making the request, if anyone.
///
/// Never persisted. Immutable once the resolver has built it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    session_ref: Option<SessionRef>,
    user_ref: Option<UserRef>,
    organization_ref: Option<OrganizationRef>,
    link_token_ref: Option<LinkTokenRef>,
    end_customer_ref: Option<EndCustomerRef>,
    scopes: Vec<String>,
    method: Option<AuthMethod>,
    is_authenticated: bool,
}

impl Authentication {
    /// No credential, or none that checked out.
    pub fn unauthenticated() -> Self {
        Self {
            session_ref: None,
            user_ref: None,
            organization_ref: None,
            link_token_ref: None,
            end_customer_ref: None,
            scopes: Vec::new(),
            method: None,
            is_authenticated: false,
        }
    }

    /// A logged-in user acting within their organization.
    pub fn for_session(
        session_ref: SessionRef,
        user_ref: UserRef,
        organization_ref: OrganizationRef,
    ) -> Self {
        Self {
            session_ref: Some(session_ref),
            user_ref: Some(user_ref),
            organization_ref: Some(organization_ref),
            method: Some(AuthMethod::Session),
            is_authenticated: true,
            ..Self::unauthenticated()
        }
    }

    /// An organization acting through its API key. No user.
    pub fn for_api_key(organization_ref: OrganizationRef) -> Self {
        Self {
            organization_ref: Some(organization_ref),
            method: Some(AuthMethod::ApiKey),
            is_authenticated: true,
            ..Self::unauthenticated()
        }
    }

    /// An end customer holding a link token from an organization.
    pub fn for_link(
        link_token_ref: LinkTokenRef,
        organization_ref: OrganizationRef,
        end_customer_ref: EndCustomerRef,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            link_token_ref: Some(link_token_ref),
            organization_ref: Some(organization_ref),
            end_customer_ref: Some(end_customer_ref),
            scopes,
            method: Some(AuthMethod::LinkToken),
            is_authenticated: true,
            ..Self::unauthenticated()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }

    pub fn session_ref(&self) -> Option<&SessionRef> {
        self.session_ref.as_ref()
    }

    pub fn user_ref(&self) -> Option<&UserRef> {
        self.user_ref.as_ref()
    }

    pub fn organization_ref(&self) -> Option<&OrganizationRef> {
        self.organization_ref.as_ref()
    }

    pub fn link_token_ref(&self) -> Option<&LinkTokenRef> {
        self.link_token_ref.as_ref()
    }

    pub fn end_customer_ref(&self) -> Option<&EndCustomerRef> {
        self.end_customer_ref.as_ref()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Whether a link-token grant includes `scope`. Other methods carry no scopes.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
