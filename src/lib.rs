//! Declarative element engine.
//!
//! This crate re-exports the engine from `tern-core` and adds a [`Host`], which drives the
//! pipeline from a description to live elements and takes requests from other threads, as well
//! as a small [`kit`] of element kinds.
//!
//! ```no_run
//! use tern::{kit, Env, Host, ModelSet, ParsedNode, Patch};
//!
//! let mut host = Host::new(kit::registry(), Env::root(), ModelSet::root(), Vec::<Patch>::new());
//! host.load(
//!     &ParsedNode::new("menu-bar").child(
//!         ParsedNode::new("menu")
//!             .attr("title", "File")
//!             .child(ParsedNode::new("item").attr("value", "Open")),
//!     ),
//! )
//! .unwrap();
//! ```

mod host;
pub mod kit;

pub use host::{Host, Mailbox, Request};
pub use tern_core::*;
