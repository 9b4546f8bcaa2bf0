//! Admin transport over the MQ administrative REST API.
//!
//! A node address is the web console base URL followed by the queue manager name,
//! for example `https://mq1.example.com:9443/QM1`. Sessions log in with the supplied
//! credentials, run MQSC text commands through the `runCommand` action and log out on
//! close.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod types;

pub use error::{Error, Result};

use std::time::Duration;

use affinity_admin::mqsc::{parse_response, render_inquiry};
use affinity_admin::{
    AdminSession, AdminTransport, ConnectionDescriptor, Credentials, InquireConnections,
    NodeAddress,
};
use affinity_model::NodeId;
use async_trait::async_trait;
use http::StatusCode;
use http::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, info};
use url::Url;

use crate::types::{ErrorResponse, LoginRequest, RunCommandRequest, RunCommandResponse};

/// Header the REST API requires on state-changing requests.
const CSRF_HEADER: &str = "ibm-mq-rest-csrf-token";

/// Reason code for "not authorized".
const REASON_NOT_AUTHORIZED: i64 = 2035;

/// Default per-request timeout
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for the REST transport.
#[derive(Clone, Debug)]
pub struct RestOptions {
    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Accept self-signed server certificates, as shipped by default MQ installs.
    pub accept_invalid_certs: bool,
}

impl Default for RestOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

/// Admin transport over the MQ administrative REST API.
#[derive(Clone, Debug)]
pub struct RestAdminTransport {
    client: Client,
}

impl RestAdminTransport {
    /// Creates a new `RestAdminTransport`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(options: &RestOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.request_timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;

        Ok(Self { client })
    }
}

/// Where a node's REST API lives.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Endpoint {
    base: Url,
    queue_manager: String,
}

impl Endpoint {
    fn parse(address: &NodeAddress) -> Result<Self> {
        let invalid = || Error::InvalidAddress(address.to_string());

        let url = Url::parse(address.as_str()).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(invalid());
        }

        let queue_manager = url
            .path_segments()
            .and_then(|mut segments| segments.rfind(|segment| !segment.is_empty()))
            .ok_or_else(invalid)?
            .to_string();

        let mut base = url;
        base.set_path("/");
        base.set_query(None);

        Ok(Self {
            base,
            queue_manager,
        })
    }

    fn login(&self) -> Result<Url> {
        self.base
            .join("ibmmq/rest/v2/login")
            .map_err(|_| Error::InvalidAddress(self.base.to_string()))
    }

    fn mqsc(&self) -> Result<Url> {
        self.base
            .join(&format!(
                "ibmmq/rest/v2/admin/action/qmgr/{}/mqsc",
                self.queue_manager
            ))
            .map_err(|_| Error::InvalidAddress(self.base.to_string()))
    }
}

#[async_trait]
impl AdminTransport for RestAdminTransport {
    type Error = Error;
    type Session = RestSession;

    async fn open_session(
        &self,
        node: &NodeAddress,
        credentials: &Credentials,
    ) -> Result<Self::Session> {
        let endpoint = Endpoint::parse(node)?;

        let token = match (credentials.user(), credentials.password()) {
            (Some(username), Some(password)) => {
                let response = self
                    .client
                    .post(endpoint.login()?)
                    .header(CSRF_HEADER, "affinity")
                    .json(&LoginRequest { username, password })
                    .send()
                    .await?;

                let response = check_status(response, &endpoint).await?;
                let token = session_cookie(&response);
                info!(node = %node, user = username, "logged in to admin REST API");
                token
            }
            _ => None,
        };

        Ok(RestSession {
            client: self.client.clone(),
            node_id: NodeId::new(endpoint.queue_manager.clone()),
            endpoint,
            token,
        })
    }
}

/// A logged-in REST session on one queue manager.
#[derive(Debug)]
pub struct RestSession {
    client: Client,
    endpoint: Endpoint,
    node_id: NodeId,
    token: Option<String>,
}

impl RestSession {
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(CSRF_HEADER, "affinity");
        match &self.token {
            Some(token) => request.header(COOKIE, token),
            None => request,
        }
    }
}

#[async_trait]
impl AdminSession for RestSession {
    type Error = Error;

    fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn inquire_connections(
        &self,
        request: &InquireConnections,
    ) -> Result<Vec<ConnectionDescriptor>> {
        let command = render_inquiry(request);
        debug!(node = %self.node_id, "running {command}");

        let response = self
            .authorized(self.client.post(self.endpoint.mqsc()?))
            .json(&RunCommandRequest::new(&command))
            .send()
            .await?;

        let response = check_status(response, &self.endpoint).await?;
        let body: RunCommandResponse = serde_json::from_str(&response.text().await?)?;

        if body.overall_reason_code == REASON_NOT_AUTHORIZED {
            return Err(Error::NotAuthorized(body.overall_reason_code));
        }

        let text: Vec<&str> = body
            .command_response
            .iter()
            .flat_map(|response| response.text.iter().map(String::as_str))
            .collect();

        let descriptors = parse_response(&text.join("\n")).map_err(Error::Mqsc)?;

        if body.overall_completion_code != 0 && descriptors.is_empty() {
            return Err(Error::Rejected(format!(
                "completion code {} reason {}",
                body.overall_completion_code, body.overall_reason_code
            )));
        }

        Ok(descriptors)
    }

    async fn close(self) -> Result<()> {
        if self.token.is_none() {
            return Ok(());
        }

        let response = self
            .authorized(self.client.delete(self.endpoint.login()?))
            .send()
            .await?;

        check_status(response, &self.endpoint).await?;
        debug!(node = %self.node_id, "logged out of admin REST API");

        Ok(())
    }
}

async fn check_status(response: Response, endpoint: &Endpoint) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .ok()
        .and_then(|body| serde_json::from_str::<ErrorResponse>(&body).ok())
        .and_then(|body| body.message())
        .unwrap_or_else(|| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(status),
        StatusCode::BAD_REQUEST => Error::Rejected(message),
        StatusCode::NOT_FOUND | StatusCode::SERVICE_UNAVAILABLE => {
            Error::QueueManagerUnavailable(endpoint.queue_manager.clone())
        }
        _ => Error::Status(status),
    })
}

/// Collect `name=value` pairs from every `Set-Cookie` header into one `Cookie` value.
fn session_cookie(response: &Response) -> Option<String> {
    let cookies: Vec<&str> = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();

    (!cookies.is_empty()).then(|| cookies.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_address() {
        let endpoint = Endpoint::parse(&NodeAddress::new("https://mq1:9443/QM1")).unwrap();

        assert_eq!(endpoint.queue_manager, "QM1");
        assert_eq!(
            endpoint.mqsc().unwrap().as_str(),
            "https://mq1:9443/ibmmq/rest/v2/admin/action/qmgr/QM1/mqsc"
        );
        assert_eq!(
            endpoint.login().unwrap().as_str(),
            "https://mq1:9443/ibmmq/rest/v2/login"
        );
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let endpoint = Endpoint::parse(&NodeAddress::new("http://localhost:9080/QM2/")).unwrap();
        assert_eq!(endpoint.queue_manager, "QM2");
    }

    #[test]
    fn test_endpoint_requires_queue_manager() {
        assert!(Endpoint::parse(&NodeAddress::new("https://mq1:9443")).is_err());
        assert!(Endpoint::parse(&NodeAddress::new("QM1")).is_err());
    }
}
