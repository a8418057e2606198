//! Database entity models.

pub mod client_application;
pub mod delivery;
pub mod destination;
pub mod provisioning_event;
pub mod resource_mapping;
pub mod scim_scope;
pub mod signing_key;
pub mod tenant;

pub use client_application::{ClientApplication, CreateClientApplication};
pub use delivery::{Delivery, DeliveryStatus};
pub use destination::{CreateDestination, Destination, UpdateDestination};
pub use provisioning_event::ProvisioningEvent;
pub use resource_mapping::ResourceMapping;
pub use scim_scope::ScimScope;
pub use signing_key::{CreateSigningKey, SigningKey};
pub use tenant::Tenant;
