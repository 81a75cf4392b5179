//! Graft HTML - parsing and serialization
//!
//! Wraps html5ever's RcDom and converts into the `graft-dom` arena
//! format. Fragment parsing feeds the swap engine; serialization feeds
//! history snapshots.

mod parse;
mod serialize;

pub use parse::{Fragment, HtmlParser};
pub use serialize::{inner_html, outer_html};
