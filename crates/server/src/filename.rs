//! Upload name checks.

use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;

/// Extension allow-list applied to the name a client declares for an upload.
#[derive(Clone, Debug)]
pub struct FilenamePolicy {
    allowed_extensions: BTreeSet<String>,
}

impl FilenamePolicy {
    pub fn new<I, S>(allowed_extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_extensions: allowed_extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// The extension is whatever follows the last `.`, compared case-sensitively.
    #[must_use]
    pub fn is_allowed(&self, file_name: &str) -> bool {
        file_name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| self.allowed_extensions.contains(ext))
    }

    /// Returns the name to store an upload under, or `None` when the upload
    /// should be ignored.
    #[must_use]
    pub fn accept(&self, file_name: &str) -> Option<String> {
        if !self.is_allowed(file_name) {
            return None;
        }

        let name = secure_filename(file_name);

        (!name.is_empty()).then_some(name)
    }
}

/// Flattens a client-supplied name into a single safe path component.
///
/// The name is NFKD-normalized and whatever is still non-ASCII is dropped,
/// so accented letters keep their base letter. Path separators become word breaks,
/// words are joined with `_`, anything outside `[A-Za-z0-9_.-]` is removed
/// and leading or trailing `.`/`_` are trimmed. The result may be empty.
#[must_use]
pub fn secure_filename(file_name: &str) -> String {
    let flattened: String = file_name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_owned()
}

/// Whether `file_name` names an entry directly inside a folder.
#[must_use]
pub fn is_plain_file_name(file_name: &str) -> bool {
    !file_name.is_empty()
        && file_name != "."
        && file_name != ".."
        && !file_name.contains(['/', '\\', '\0'])
}
