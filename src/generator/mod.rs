//! Case block generator – write case management XML into a parsed form.
//!
//! This module provides:
//! - [`binds`] – Binds, setvalues, secondary instances and the `<meta>` block.
//! - [`case_block`] – A single `<case>` element with create/update/close/index children.
//! - [`parents`] – Updates to related cases, nested under `<parents>`.
//! - [`schedule`] – Visit schedule calculations for advanced forms.
//! - [`synthesize`] – Whole-form synthesis from a [`CaseActionModel`](crate::model::CaseActionModel).
//! - [`xpath`] – Typed XPath builders for case ids and casedb lookups.
//! - [`render`] – Serialize the edited tree back to XML text.

pub mod binds;
pub mod case_block;
pub mod parents;
pub mod render;
pub mod schedule;
pub mod synthesize;
pub mod xpath;

pub use case_block::{CaseBlock, CreateBlock, IndexRef, OwnerPolicy, UpdateOptions};
pub use render::render_document;
pub use xpath::{CaseIDXPath, CaseXPath, XPath};
