//! Bundled extension tags

pub mod nowiki;
pub mod pre;

pub use nowiki::Nowiki;
pub use pre::Pre;
