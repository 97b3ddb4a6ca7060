//! External collaborator contracts (§6.1)
//!
//! This crate depends on these traits but ships no production implementation
//! of any of them; fixtures implementing them live only under `tests/`.

use crate::model::{ObjectType, Operation, Payload, Row};
use async_trait::async_trait;
use std::fmt;

/// A server-assigned resource id, returned by a successful CREATE.
pub type ResourceId = i64;

/// The caller-chosen identifier a `find_by_natural_key` lookup searches on;
/// what it actually contains is type-specific (a CIDR, an FQDN, an address),
/// so it is carried as a plain string rather than a closed enum — the engine
/// never interprets it itself, only the client implementation does.
pub type NaturalKey = str;

/// Failure surface of [`IpamClient`] (§6.1, §7).
#[derive(Debug, Clone)]
pub enum ClientError {
    /// The server reported the resource already exists (HTTP 409 or equivalent)
    AlreadyExists(String),
    /// The server reported the resource does not exist
    NotFound(String),
    /// The server asked the caller to back off; carries the retry delay in seconds
    RateLimit { retry_after_secs: u64 },
    /// Any other server-side failure
    Server(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            ClientError::NotFound(msg) => write!(f, "not found: {msg}"),
            ClientError::RateLimit { retry_after_secs } => {
                write!(f, "rate limited, retry after {retry_after_secs}s")
            }
            ClientError::Server(msg) => write!(f, "server error: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Handler-facing surface of the remote IPAM server (§6.1 "IPAM client").
/// The engine assumes only these method-shaped hooks; it never assumes a
/// particular wire protocol.
#[async_trait]
pub trait IpamClient: Send + Sync {
    /// Create a resource of `object_type` from `payload`, returning its
    /// server-assigned id.
    async fn create(&self, object_type: ObjectType, payload: &Payload) -> Result<ResourceId, ClientError>;

    /// Update `id` (of `object_type`) with the fields in `payload`.
    async fn update(&self, id: ResourceId, object_type: ObjectType, payload: &Payload) -> Result<(), ClientError>;

    /// Delete `id` (of `object_type`). `allow_dangerous` mirrors the source
    /// system's explicit safety flag threaded through to the transport layer.
    async fn delete(&self, id: ResourceId, object_type: ObjectType, allow_dangerous: bool) -> Result<(), ClientError>;

    /// Look up an existing resource by its type-specific natural key
    /// (§4.6.4). Returns `Ok(None)` on a clean miss — never enumerates
    /// globally.
    async fn find_by_natural_key(
        &self,
        object_type: ObjectType,
        natural_key: &NaturalKey,
    ) -> Result<Option<ResourceId>, ClientError>;
}

/// Turns a desired [`Row`] into an [`Operation`] (§6.1 "Operation factory").
/// Row-to-payload attribute mapping lives with the (external) CSV layer; this
/// crate only depends on the boundary.
pub trait OperationFactory: Send + Sync {
    fn create_from_row(&self, row: &Row) -> Operation;
}

/// Invalidates cached path -> id lookups after a mutation (§6.1 "Resolver cache").
pub trait ResolverCache: Send + Sync {
    fn invalidate(&self, path: &str, object_type: ObjectType);
}

/// Derive the parent path to also invalidate alongside `path` itself (§6.1):
/// if the last `/`-segment is all digits, the path is a CIDR-in-config form
/// and the parent is the config (first segment); otherwise the parent is
/// everything before the last `/`.
pub fn parent_path(path: &str) -> Option<&str> {
    let (head, tail) = path.rsplit_once('/')?;
    if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
        return path.split('/').next().filter(|s| !s.is_empty());
    }
    Some(head).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_form_parent_is_the_config_segment() {
        assert_eq!(parent_path("Default/10.0.0.0/8"), Some("Default"));
    }

    #[test]
    fn plain_path_parent_is_everything_before_last_segment() {
        assert_eq!(parent_path("Default/USA/CA"), Some("Default/USA"));
    }

    #[test]
    fn path_without_separator_has_no_parent() {
        assert_eq!(parent_path("Default"), None);
    }
}
