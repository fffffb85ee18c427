/*
 * Copyright 2024 Oxide Computer Company
 */

/*
 * Request and response bodies for the Keystone v2.0 token API.  We only model
 * the parts we actually use; everything else in the response is ignored.
 */

use serde::{Deserialize, Serialize};

use super::{Credentials, StoreError, StoreResult};

#[derive(Serialize, Debug)]
pub(crate) struct TokenRequest<'a> {
    auth: AuthRequest<'a>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    tenant_name: &'a str,
    password_credentials: PasswordCredentials<'a>,
}

#[derive(Serialize, Debug)]
struct PasswordCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl<'a> TokenRequest<'a> {
    pub(crate) fn new(creds: &'a Credentials) -> TokenRequest<'a> {
        TokenRequest {
            auth: AuthRequest {
                tenant_name: &creds.tenant,
                password_credentials: PasswordCredentials {
                    username: &creds.username,
                    password: &creds.password,
                },
            },
        }
    }
}

#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    access: Access,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Access {
    token: Token,
    #[serde(default)]
    service_catalog: Vec<Service>,
}

#[derive(Deserialize, Debug)]
struct Token {
    id: String,
}

#[derive(Deserialize, Debug)]
struct Service {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "type")]
    type_: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize, Debug)]
struct Endpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
}

/**
 * A token and the storage URL it is good for.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Session {
    pub token: String,
    pub storage_url: String,
}

impl TokenResponse {
    /**
     * Locate the object store in the service catalog: the service named
     * "swift" if there is one, otherwise any service of type "object-store".
     */
    pub(crate) fn into_session(self) -> StoreResult<Session> {
        let service = self
            .access
            .service_catalog
            .iter()
            .find(|s| s.name == "swift")
            .or_else(|| {
                self.access
                    .service_catalog
                    .iter()
                    .find(|s| s.type_ == "object-store")
            })
            .ok_or_else(|| {
                StoreError::BadAuthResponse(
                    "no object store in service catalog".into(),
                )
            })?;

        let Some(endpoint) = service.endpoints.first() else {
            return Err(StoreError::BadAuthResponse(format!(
                "service {:?} has no endpoints",
                service.name
            )));
        };

        Ok(Session {
            token: self.access.token.id.to_string(),
            storage_url: endpoint
                .public_url
                .trim_end_matches('/')
                .to_string(),
        })
    }
}
