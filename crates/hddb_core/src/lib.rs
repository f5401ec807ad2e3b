pub mod api;
pub mod error;
pub mod ident;
pub mod ids;
pub mod params;
pub mod query;
pub mod schema;
pub mod value;

pub use api::*;
pub use error::{ErrorContext, HdError, HdResult};
pub use ident::*;
pub use ids::*;
pub use params::*;
pub use schema::*;
pub use value::*;
