//! # ostiary-scim-client
//!
//! SCIM 2.0 wire layer for outbound provisioning.
//!
//! Three concerns live here:
//!
//! - [`client::ScimClient`] — one-shot HTTP requests against a downstream
//!   SCIM service provider. Responses are always returned as a value
//!   ([`client::ScimResponse`]); transport failures surface as status `0`
//!   rather than as errors, so retry classification stays a pure function
//!   of the response.
//! - [`mapper`] — translation from local entity snapshots to SCIM JSON,
//!   including configurable attribute mappings and PATCH envelopes.
//! - [`token`] — short-lived signed bearer tokens minted per delivery
//!   attempt, over an abstract [`token::TokenSigner`].

pub mod client;
pub mod error;
pub mod mapper;
pub mod token;

pub use client::{ScimClient, ScimMethod, ScimRequest, ScimResponse};
pub use error::{ScimClientError, ScimClientResult};
pub use token::{DbTokenSigner, ProvisioningClaims, TokenMinter, TokenSigner};
