use serde::{Deserialize, Serialize};

/// Ability set granted by a personal access token.
///
/// Stored on disk as a JSON array of strings; a single `"*"` element is the
/// legacy wildcard and grants everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abilities(Vec<String>);

impl Abilities {
    pub fn new(abilities: Vec<String>) -> Self {
        Self(abilities)
    }

    pub fn wildcard() -> Self {
        Self(vec!["*".to_string()])
    }

    /// Decodes the persisted JSON array form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Vec<String>>(raw).map(Self)
    }

    pub fn allows(&self, required: &str) -> bool {
        self.0
            .iter()
            .any(|ability| ability == "*" || ability == required)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}
