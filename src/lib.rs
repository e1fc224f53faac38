//! XForm question tree parser and case block synthesizer.
//!
//! [`XForm`] loads a CommCare-style XForm into an editable tree, lists its
//! questions and translations, and writes case management XML (`<case>`
//! blocks, binds, setvalues and the `<meta>` block) from a
//! [`CaseActionModel`].
//!
//! The binary `xformcase` prints questions as JSON and runs synthesis over
//! single forms or whole directories.

pub mod dom;
pub mod error;
pub mod generator;
pub mod model;
pub mod parser;

pub use error::{CaseErrorKind, Result, XFormError};
pub use model::{CaseAction, CaseActionModel, PropertyUsage, Question, QuestionOptions};
pub use parser::XForm;
