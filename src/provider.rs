//! Identity-provider descriptors (data) and strategies (behavior).
//!
//! `descriptor` exposes validated metadata ([`ProviderDescriptor`]): the token endpoint, the
//! enabled grants, the client authentication method, and the scopes sent with password
//! logins. `strategy` defines [`ProviderStrategy`], the HTTP-client-agnostic hook flows use
//! to decorate token requests and to classify rejections for user messaging.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;
