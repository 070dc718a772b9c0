use serde::{Deserialize, Serialize};

/// A search hit from the metadata API's `search.json` endpoint.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenLibraryDoc {
    /// Work key, e.g. `/works/OL45804W`
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author_name: Vec<String>,
    /// Numeric cover id, turned into an image URL by [`crate::metadata::client::cover_url`]
    #[serde(default)]
    pub cover_i: Option<i64>,
    #[serde(default)]
    pub subject: Vec<String>,
    #[serde(default)]
    pub first_publish_year: Option<i32>,
}

impl OpenLibraryDoc {
    #[must_use]
    #[inline]
    pub const fn new(
        key: String,
        title: String,
        author_name: Vec<String>,
        cover_i: Option<i64>,
    ) -> Self {
        Self {
            key,
            title,
            author_name,
            cover_i,
            subject: Vec::new(),
            first_publish_year: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub docs: Vec<OpenLibraryDoc>,
}

/// An author reference inside a subject listing.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAuthor {
    pub name: String,
}

/// A work listed under a subject. Same record as a search hit, different field names.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectWork {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<SubjectAuthor>,
    #[serde(default)]
    pub cover_id: Option<i64>,
    #[serde(default)]
    pub subject: Vec<String>,
    #[serde(default)]
    pub first_publish_year: Option<i32>,
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl From<SubjectWork> for OpenLibraryDoc {
    fn from(work: SubjectWork) -> Self {
        Self {
            key: work.key,
            title: work.title,
            author_name: work.authors.into_iter().map(|author| author.name).collect(),
            cover_i: work.cover_id,
            subject: work.subject,
            first_publish_year: work.first_publish_year,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubjectResponse {
    #[serde(default)]
    pub works: Vec<SubjectWork>,
}

/// Free text that the metadata API returns either as a plain string or as a typed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextValue {
    Plain(String),
    Typed { value: String },
}

impl TextValue {
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(text) | Self::Typed { value: text } => text,
        }
    }
}

/// Details of a single work from `works/<id>.json`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDetails {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<TextValue>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub covers: Vec<i64>,
}

/// Cover image sizes served by the covers endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoverSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl CoverSize {
    #[must_use]
    #[inline]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Small => "S",
            Self::Medium => "M",
            Self::Large => "L",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_search_docs_with_missing_fields() {
        let body = r#"{
            "numFound": 2,
            "docs": [
                {"key": "/works/OL1W", "title": "Dune", "author_name": ["Frank Herbert"],
                 "cover_i": 11481354},
                {"key": "/works/OL2W", "title": "Untitled"}
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.docs.len(), 2);
        assert_eq!(response.docs[0].cover_i, Some(11_481_354));
        assert!(response.docs[1].author_name.is_empty());
    }

    #[test]
    fn subject_work_converts_to_search_shape() {
        let body = r#"{
            "key": "/works/OL3W",
            "title": "The Hobbit",
            "authors": [{"key": "/authors/OL1A", "name": "J.R.R. Tolkien"}],
            "cover_id": 6979861
        }"#;
        let work: SubjectWork = serde_json::from_str(body).unwrap();
        let doc = OpenLibraryDoc::from(work);
        assert_eq!(doc.author_name, vec!["J.R.R. Tolkien".to_owned()]);
        assert_eq!(doc.cover_i, Some(6_979_861));
    }

    #[test]
    fn work_description_accepts_both_shapes() {
        let plain: WorkDetails =
            serde_json::from_str(r#"{"key": "/works/OL1W", "description": "Spice."}"#).unwrap();
        let typed: WorkDetails = serde_json::from_str(
            r#"{"key": "/works/OL1W", "description": {"type": "/type/text", "value": "Spice."}}"#,
        )
        .unwrap();
        assert_eq!(plain.description.unwrap().as_str(), "Spice.");
        assert_eq!(typed.description.unwrap().as_str(), "Spice.");
    }
}
