//! Entity variants and the capability contracts they share.
//!
//! Every variant is a plain serde struct implementing [`Entity`]: it carries a
//! server-assigned identifier, validates itself, and names the fields that
//! filtered queries may use. Variants whose write shape differs from their
//! persisted shape provide a separate [`RequestShape`].

mod app;
mod binding;
mod dns_config;
mod node;
mod traffic_policy;
mod validate;

pub use app::{App, PortSpec};
pub use binding::{
    LifecycleCommand, NodeApp, NodeAppRequest, NodeAppResponse, NodeAppTrafficPolicy,
    NodeDnsConfig,
};
pub use dns_config::{DnsARecord, DnsConfig, DnsForwarder};
pub use node::Node;
pub use traffic_policy::{TrafficPolicy, TrafficRule};
pub use validate::ValidationError;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Storage and routing metadata for one entity variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    /// Collection name, used as table key and HTTP path segment.
    pub name: &'static str,
    /// Fields accepted by filtered queries.
    pub filter_fields: &'static [&'static str],
}

impl Collection {
    /// Whether `field` may be used in a filtered query.
    #[must_use]
    pub fn allows_filter(&self, field: &str) -> bool {
        self.filter_fields.contains(&field)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Capabilities every persisted entity variant provides.
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Collection name.
    const COLLECTION: &'static str;

    /// Fields accepted by filtered queries. Empty means no field is
    /// filterable.
    const FILTER_FIELDS: &'static [&'static str] = &[];

    /// Server-assigned identifier, empty before creation.
    fn id(&self) -> &str;

    /// Assign the identifier.
    fn set_id(&mut self, id: String);

    /// Check field-level rules, reporting the first failure.
    fn validate(&self) -> Result<(), ValidationError>;

    /// Metadata for this variant's collection.
    #[must_use]
    fn collection() -> Collection {
        Collection {
            name: Self::COLLECTION,
            filter_fields: Self::FILTER_FIELDS,
        }
    }
}

/// Shape accepted when updating entities of type `E`.
///
/// Most variants update with their own persisted shape; the blanket
/// implementation covers those.
pub trait RequestShape<E: Entity>: DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Check field-level rules of the request.
    fn validate_request(&self) -> Result<(), ValidationError>;

    /// The entity to persist once the request has been processed.
    fn into_entity(self) -> E;
}

impl<E: Entity> RequestShape<E> for E {
    fn validate_request(&self) -> Result<(), ValidationError> {
        self.validate()
    }

    fn into_entity(self) -> E {
        self
    }
}

/// Generate a fresh entity identifier.
#[must_use]
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
