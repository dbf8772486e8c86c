//! Typed state cells kept in sync with URL query parameters.
//!
//! A [`ParamStore`] holds the query parameters of the current location,
//! together with its navigation history. [`query_state`] binds a typed value
//! to one parameter of the store:
//!
//! ```rust
//! use urlstate::{ParamStore, QueryStateConfig, query_state};
//!
//! let store = ParamStore::from_uri("/items?page=5").unwrap();
//! let (page, set_page) = query_state(&store, QueryStateConfig::<u32>::parse("page"));
//! assert_eq!(page.get(), 5);
//!
//! set_page.update(|p| p + 1);
//! assert_eq!(store.get("page").as_deref(), Some("6"));
//!
//! store.back();
//! assert_eq!(page.get(), 5);
//! ```
//!
//! Writes made through the setter update the value and the parameter in
//! one step. Changes of the parameter made elsewhere are decoded back into
//! the value, and never cause a write of their own.

mod codec;
mod error;
mod params;
mod query_state;
mod store;
mod utils;

pub use codec::{Codec, FnCodec, JsonCodec, ParseCodec};
pub use error::{Error, Result};
pub use params::QueryParams;
pub use query_state::{QueryState, QueryStateConfig, SetQueryState, Update, query_state};
pub use store::{HistoryMode, ListenerId, ListenerKey, ParamStore, ParamsChange, Revision};
