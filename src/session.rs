//! Session identity — which backend conversation a panel talks to.
//!
//! A session is the (folder, document) pair. The backend id strips all
//! whitespace from the document title, so two titles that differ only in
//! spacing share one backend session; that collision is accepted and logged
//! at debug level when it changes the title.

use tracing::debug;

/// Stable identity of one mounted chat panel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    pub folder: String,
    pub document: String,
    session_id: String,
}

impl SessionIdentity {
    /// Build an identity. Returns `None` when either identifier is blank.
    #[must_use]
    pub fn new(folder: impl Into<String>, document: impl Into<String>) -> Option<Self> {
        let folder = folder.into();
        let document = document.into();
        if folder.trim().is_empty() || document.trim().is_empty() {
            return None;
        }

        let compact: String = document.chars().filter(|c| !c.is_whitespace()).collect();
        if compact != document {
            debug!(%document, %compact, "session id strips whitespace from document title");
        }
        let session_id = format!("{folder}_{compact}");
        Some(Self { folder, document, session_id })
    }

    /// Identifier scoping backend chat history.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Document path used by the HTTP chat route: `{folder}/{document}`.
    #[must_use]
    pub fn document_path(&self) -> String {
        format!("{}/{}", self.folder, self.document)
    }
}
