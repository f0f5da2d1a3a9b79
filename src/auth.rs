//! Auth-domain identifiers, credentials, scopes, token records, and the JWT inspector.

pub mod credentials;
pub mod id;
pub mod jwt;
pub mod scope;
pub mod token;

pub use credentials::*;
pub use id::*;
pub use jwt::{DecodedClaims, MalformedToken, RoleSet, UserRoles};
pub use scope::*;
pub use token::{record::*, secret::*};
