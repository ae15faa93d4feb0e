//! Category listing: build the documents URL for a course, fetch it, pull the document links out
//! of the HTML.
//!
//! The portal serves Latin-1 pages, so links are matched on the undecoded body. Filenames are
//! decoded explicitly and request paths keep the original bytes.

use crate::model::{Category, CourseSelector, DocumentRef, Session};
use crate::scraper::client::{read_bytes, require_ok, PortalClient};
use crate::scraper::compile_bytes;
use crate::scraper::error::FetchError;
use std::collections::HashSet;
use tracing::debug;

/// Institution id the portal expects on every listing request.
const INSTITUTION: u32 = 97747;
/// Document links: a literal `/objecto` prefix followed by the query up to the closing quote.
const DOCUMENT_PATTERN: &str = r#"(?-u)/objecto?[^"]*"#;
/// The filename is everything after `oin=`.
const FILENAME_PATTERN: &str = r"(?-u)(?:oin=)(.*)";

/// Listing URL for one course and category. Parameter names are Latin-1 percent-encoded, as the
/// portal expects.
pub fn listing_url(client: &PortalClient, course: &CourseSelector, category: &Category) -> String {
    client.url_for(&format!(
        "/utente/eu/aluno/ano_lectivo/unidades/unidade_curricular/actividade/documentos\
         ?tipo_de_per%EDodo_lectivo=s&ano_lectivo={}&per%EDodo_lectivo={}&aluno={}\
         &institui%E7%E3o={}&unidade_curricular={}&tipo_de_documento_de_unidade={}",
        course.academic_year,
        course.semester,
        course.enrollment_number,
        INSTITUTION,
        course.course_code,
        category.code,
    ))
}

/// Fetch the listing for `category` and return its documents in page order.
///
/// An empty listing is `Ok(vec![])`. A link whose filename cannot be parsed fails the whole
/// listing with [`FetchError::MalformedDocumentUrl`].
pub fn list_documents(
    client: &PortalClient,
    session: &Session,
    course: &CourseSelector,
    category: &Category,
) -> Result<Vec<DocumentRef>, FetchError> {
    let url = listing_url(client, course, category);
    let context = format!("listing {}", category.name);
    let response = require_ok(client.get(&url, Some(session))?, &url, &context)?;
    let body = read_bytes(response, &url)?;
    let documents = extract_documents(&body)?;
    debug!(category = category.name, count = documents.len(), "listed documents");
    Ok(documents)
}

/// Extract every document link from a listing page. Repeated links are kept once.
pub fn extract_documents(page: &[u8]) -> Result<Vec<DocumentRef>, FetchError> {
    let links = compile_bytes(DOCUMENT_PATTERN)?;
    let filename = compile_bytes(FILENAME_PATTERN)?;
    let charset = PageCharset::detect(page);
    let mut seen = HashSet::new();
    let mut documents = Vec::new();
    for m in links.find_iter(page) {
        let raw = m.as_bytes();
        if !seen.insert(raw) {
            continue;
        }
        let path = escape_path(raw);
        let name = filename
            .captures(raw)
            .and_then(|c| c.get(1))
            .map(|c| charset.decode(c.as_bytes()))
            .filter(|n| is_plain_filename(n))
            .ok_or_else(|| FetchError::MalformedDocumentUrl { url: path.clone() })?;
        documents.push(DocumentRef {
            path,
            filename: name,
        });
    }
    Ok(documents)
}

/// Encoding used for the filenames of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageCharset {
    Utf8,
    Latin1,
}

impl PageCharset {
    /// UTF-8 if the whole page is valid UTF-8, Latin-1 otherwise. One choice per page, so two
    /// different byte strings never decode to the same name.
    fn detect(page: &[u8]) -> Self {
        if std::str::from_utf8(page).is_ok() {
            PageCharset::Utf8
        } else {
            PageCharset::Latin1
        }
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            PageCharset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            PageCharset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Request path for a raw link. Printable ASCII is kept and every other byte is percent-encoded,
/// so the portal gets back exactly the bytes it served.
fn escape_path(raw: &[u8]) -> String {
    let mut path = String::with_capacity(raw.len());
    for &b in raw {
        if b.is_ascii_graphic() {
            path.push(char::from(b));
        } else {
            path.push_str(&format!("%{:02X}", b));
        }
    }
    path
}

/// Reject names that would escape the category directory.
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CATEGORIES;
    use crate::test_support::MockPortal;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, ResponseTemplate};

    fn course() -> CourseSelector {
        CourseSelector {
            semester: 2,
            course_code: 11504,
            academic_year: 2022,
            enrollment_number: 54321,
        }
    }

    fn exames() -> Category {
        CATEGORIES[4]
    }

    fn link(oid: u32, name: &str) -> String {
        format!(
            r#"<tr><td><a href="/objecto?oid={}&oin={}">{}</a></td></tr>"#,
            oid, name, name
        )
    }

    #[test]
    fn listing_url_carries_every_parameter() -> Result<(), reqwest::Error> {
        let client = PortalClient::builder().base_url("https://clip.test").build()?;
        let url = listing_url(&client, &course(), &exames());
        assert!(url.starts_with(
            "https://clip.test/utente/eu/aluno/ano_lectivo/unidades/unidade_curricular/actividade/documentos?"
        ));
        for part in [
            "tipo_de_per%EDodo_lectivo=s",
            "&ano_lectivo=2022",
            "&per%EDodo_lectivo=2",
            "&aluno=54321",
            "&institui%E7%E3o=97747",
            "&unidade_curricular=11504",
            "&tipo_de_documento_de_unidade=ex",
        ] {
            assert!(url.contains(part), "missing {} in {}", part, url);
        }
        assert!(!url.contains(' '));
        Ok(())
    }

    #[test]
    fn extracts_all_links_in_order() -> Result<(), FetchError> {
        let html = format!(
            "<table>{}{}{}</table>",
            link(1, "exame-2021.pdf"),
            link(2, "exame-2022.pdf"),
            link(3, "solucoes.zip")
        );
        let docs = extract_documents(html.as_bytes())?;
        let names: Vec<_> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["exame-2021.pdf", "exame-2022.pdf", "solucoes.zip"]);
        assert_eq!(docs[0].path, "/objecto?oid=1&oin=exame-2021.pdf");
        Ok(())
    }

    #[test]
    fn no_links_is_empty_not_error() -> Result<(), FetchError> {
        assert!(extract_documents(b"<html><body>Sem documentos</body></html>")?.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_links_are_kept_once() -> Result<(), FetchError> {
        let html = format!("{}{}", link(7, "a.pdf"), link(7, "a.pdf"));
        assert_eq!(extract_documents(html.as_bytes())?.len(), 1);
        Ok(())
    }

    #[test]
    fn link_without_filename_fails_whole_listing() {
        let html = format!(
            r#"{}<a href="/objecto?oid=9">broken</a>{}"#,
            link(1, "a.pdf"),
            link(2, "b.pdf")
        );
        match extract_documents(html.as_bytes()) {
            Err(FetchError::MalformedDocumentUrl { url }) => assert_eq!(url, "/objecto?oid=9"),
            other => panic!("expected MalformedDocumentUrl, got {:?}", other),
        }
    }

    #[test]
    fn filename_with_path_separator_is_malformed() {
        let html = link(1, "../../etc/passwd");
        assert!(matches!(
            extract_documents(html.as_bytes()),
            Err(FetchError::MalformedDocumentUrl { .. })
        ));
    }

    #[test]
    fn latin1_names_are_decoded_and_kept_apart() -> Result<(), FetchError> {
        let page = b"<a href=\"/objecto?oid=1&oin=\xC9poca.pdf\">x</a>\
                     <a href=\"/objecto?oid=2&oin=\xC1poca.pdf\">y</a>";
        let docs = extract_documents(page)?;
        let names: Vec<_> = docs.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, ["\u{C9}poca.pdf", "\u{C1}poca.pdf"]);
        assert_eq!(docs[0].path, "/objecto?oid=1&oin=%C9poca.pdf");
        assert_eq!(docs[1].path, "/objecto?oid=2&oin=%C1poca.pdf");
        Ok(())
    }

    #[test]
    fn utf8_page_keeps_utf8_names() -> Result<(), FetchError> {
        let docs = extract_documents(link(1, "Época.pdf").as_bytes())?;
        assert_eq!(docs[0].filename, "Época.pdf");
        assert_eq!(docs[0].path, "/objecto?oid=1&oin=%C3%89poca.pdf");
        Ok(())
    }

    #[test]
    fn list_documents_reads_latin1_body_undecoded() -> Result<(), FetchError> {
        let portal = MockPortal::start();
        portal.mount(
            Mock::given(method("GET")).respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    b"<a href=\"/objecto?oid=1&oin=Sem\xE1foro.pdf\">s</a>".to_vec(),
                    "text/html; charset=ISO-8859-1",
                ),
            ),
        );
        let session = Session {
            name: "sid".into(),
            value: "x".into(),
        };
        let docs = list_documents(&portal.client(), &session, &course(), &exames())?;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].filename, "Sem\u{E1}foro.pdf");
        assert_eq!(docs[0].path, "/objecto?oid=1&oin=Sem%E1foro.pdf");
        Ok(())
    }

    #[test]
    fn list_documents_sends_cookie_and_parses_body() -> Result<(), FetchError> {
        let portal = MockPortal::start();
        let body = format!("{}{}{}", link(1, "a.pdf"), link(2, "b.pdf"), link(3, "c.pdf"));
        portal.mount(
            Mock::given(method("GET"))
                .and(path(
                    "/utente/eu/aluno/ano_lectivo/unidades/unidade_curricular/actividade/documentos",
                ))
                .and(query_param("tipo_de_documento_de_unidade", "ex"))
                .and(query_param("unidade_curricular", "11504"))
                .and(header("cookie", "JSESSIONID=abc123"))
                .respond_with(ResponseTemplate::new(200).set_body_string(body)),
        );
        let session = Session {
            name: "JSESSIONID".into(),
            value: "abc123".into(),
        };
        let docs = list_documents(&portal.client(), &session, &course(), &exames())?;
        assert_eq!(docs.len(), 3);
        Ok(())
    }

    #[test]
    fn list_documents_non_200_is_request_failed() {
        let portal = MockPortal::start();
        portal.mount(Mock::given(method("GET")).respond_with(ResponseTemplate::new(500)));
        let session = Session {
            name: "sid".into(),
            value: "x".into(),
        };
        match list_documents(&portal.client(), &session, &course(), &exames()) {
            Err(FetchError::RequestFailed {
                status: 500,
                context,
                ..
            }) => assert_eq!(context.as_deref(), Some("listing Exames")),
            other => panic!("expected RequestFailed, got {:?}", other),
        }
    }
}
