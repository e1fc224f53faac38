//! Typed XPath builders for case references.

use std::fmt;

/// Case id of the case selected in the session.
pub const SESSION_CASE_ID: &str = "instance('commcaresession')/session/data/case_id";

pub fn session_var(var: &str) -> String {
    format!("instance('commcaresession')/session/data/{}", var)
}

/// Plain XPath expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XPath(String);

impl XPath {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(expr.into())
    }

    pub fn slash(&self, step: &str) -> XPath {
        if self.0.is_empty() {
            XPath::new(step)
        } else {
            XPath(format!("{}/{}", self.0, step))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expression evaluating to a case id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseIDXPath(XPath);

impl CaseIDXPath {
    pub fn new(expr: impl Into<String>) -> Self {
        Self(XPath::new(expr))
    }

    pub fn session() -> Self {
        Self::new(SESSION_CASE_ID)
    }

    /// The casedb entry of this id.
    pub fn case(&self) -> CaseXPath {
        CaseXPath(XPath(format!(
            "instance('casedb')/casedb/case[@case_id={}]",
            self.0
        )))
    }

    /// Follow one index per `/`-separated segment of `relation_path`
    /// (`parent/grandparent`).
    pub fn related(&self, relation_path: &str) -> CaseIDXPath {
        relation_path
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.clone(), |id, name| id.case().index_id(name))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CaseIDXPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Expression selecting a case in the casedb instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseXPath(XPath);

impl CaseXPath {
    pub fn index_id(&self, name: &str) -> CaseIDXPath {
        CaseIDXPath(self.0.slash("index").slash(name))
    }

    pub fn parent_id(&self) -> CaseIDXPath {
        self.index_id("parent")
    }

    /// Case property, with `name` and `owner_id` mapped to where the casedb
    /// stores them.
    pub fn property(&self, property: &str) -> XPath {
        let step = match property {
            "name" => "case_name",
            "owner_id" => "@owner_id",
            "case_id" => "@case_id",
            "case_type" => "@case_type",
            "status" => "@status",
            other => other,
        };
        self.0.slash(step)
    }
}

impl fmt::Display for CaseXPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
