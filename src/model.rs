//! Data model shared by the authenticator, scraper and dispatcher.
//!
//! Everything here is immutable once built; the pipeline threads these values through each call
//! instead of keeping process-wide state.

/// Login credentials for the portal. Loaded from `user.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Portal username, sent as the `identificador` form field.
    pub identifier: String,
    /// Password, sent as the `senha` form field.
    pub secret: String,
}

/// Selects the course listing to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseSelector {
    pub semester: u32,
    pub course_code: u64,
    /// Four-digit academic year (e.g. 2022).
    pub academic_year: u32,
    /// Student number as it appears in portal URLs (`aluno=`).
    pub enrollment_number: u64,
}

/// One document section of a course page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    /// Directory name used on disk.
    pub name: &'static str,
    /// Value of the `tipo_de_documento_de_unidade` query parameter.
    pub code: &'static str,
}

/// The fixed document sections, in the order they are processed.
pub const CATEGORIES: [Category; 8] = [
    Category { name: "Material-multimédia", code: "0ac" },
    Category { name: "Problemas", code: "1e" },
    Category { name: "Protocolos", code: "2tr" },
    Category { name: "Seminários", code: "3sm" },
    Category { name: "Exames", code: "ex" },
    Category { name: "Testes", code: "t" },
    Category { name: "Textos-de-apoio", code: "ta" },
    Category { name: "Outros", code: "xot" },
];

/// A scraped link to one downloadable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    /// Path and query relative to the portal root, e.g. `/objecto?oid=1&oin=notes.pdf`. Bytes
    /// outside printable ASCII are percent-encoded as served.
    pub path: String,
    /// Filename taken from the `oin=` parameter, decoded with the page's charset.
    pub filename: String,
}

/// Session cookie obtained by logging in. Reused read-only for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub name: String,
    pub value: String,
}

impl Session {
    /// Parse the first `name=value` pair of a `Set-Cookie` header value.
    ///
    /// Attributes after the first `;` are ignored. Returns `None` when there is no `=` or the name
    /// is empty.
    pub fn from_set_cookie(header: &str) -> Option<Session> {
        let pair = header.split(';').next()?;
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Session {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }

    /// Value for a `Cookie` request header.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}
