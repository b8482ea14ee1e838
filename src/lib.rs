//! Serial Pattern Link
//!
//! Message framing and recognition for byte oriented serial links. Messages are
//! described as data (a [`Catalog`] of [`MessageDef`]s), raw chunks go into a
//! [`Link`], recognized messages come out through subscriptions or one-shot waits.
//!
//! ```rust,ignore
//! let catalog = Catalog::new([
//!     MessageDef::new("line", vec![Fragment::scan("text"), Fragment::fixed("eol", b"\r\n")])?,
//! ])?;
//! let link = Link::new(catalog, LinkConfig::default());
//!
//! let next = link.await_message("line", Some(Duration::from_secs(1)))?;
//! link.ingest(b"hello\r\n");
//! assert_eq!(next.await?.value("text"), Some(&b"hello"[..]));
//! ```

pub mod ascii;
pub mod catalog;
pub mod config;
pub mod correlator;
pub mod diagnostics;
pub mod error;
pub mod link;
pub mod matcher;
pub mod message;
pub mod mxs;
pub mod stream;

pub use catalog::Catalog;
pub use config::LinkConfig;
pub use correlator::{PendingMessage, SettleState};
pub use diagnostics::{Diagnostics, TracingDiagnostics};
pub use error::{DefinitionError, Error, Result, TimeoutReport};
pub use link::Link;
pub use matcher::{MatchedMessage, Recognition};
pub use message::{Fields, Fragment, MessageDef, Pattern, Token};
pub use stream::{Filter, MessageStream, RecognizedMessage, SubscriptionId, Trim};
