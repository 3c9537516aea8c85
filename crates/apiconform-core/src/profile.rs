//! Schema registry per endpoint family

use std::path::{Path, PathBuf};

use crate::schema::{self, JsonSchema};

/// Schemas that apply to one family of endpoints.
///
/// A profile names where its XSD lives but does not open it; a missing
/// file surfaces when a case actually validates an XML body.
#[derive(Debug, Clone)]
pub struct EntityProfile {
    name: String,
    json_schema: Option<JsonSchema>,
    xsd_path: Option<PathBuf>,
}

impl EntityProfile {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            json_schema: None,
            xsd_path: None,
        }
    }

    #[must_use]
    pub fn with_json_schema(mut self, schema: impl Into<JsonSchema>) -> Self {
        self.json_schema = Some(schema.into());
        self
    }

    #[must_use]
    pub fn with_xsd(mut self, path: impl Into<PathBuf>) -> Self {
        self.xsd_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn challenges(schema_dir: &Path) -> Self {
        Self::new("challenges")
            .with_json_schema(schema::challenges_schema())
            .with_xsd(schema_dir.join("challenges.xsd"))
    }

    #[must_use]
    pub fn todos(schema_dir: &Path) -> Self {
        Self::new("todos")
            .with_json_schema(schema::todos_schema())
            .with_xsd(schema_dir.join("todos.xsd"))
    }

    /// Built-in profile by entity name (`challenges` or `todos`).
    #[must_use]
    pub fn builtin(name: &str, schema_dir: &Path) -> Option<Self> {
        match name {
            "challenges" => Some(Self::challenges(schema_dir)),
            "todos" => Some(Self::todos(schema_dir)),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn json_schema(&self) -> Option<&JsonSchema> {
        self.json_schema.as_ref()
    }

    #[must_use]
    pub fn xsd_path(&self) -> Option<&Path> {
        self.xsd_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_resolve_xsd_against_schema_dir() {
        let p = EntityProfile::todos(Path::new("/opt/schemas"));
        assert_eq!(p.name(), "todos");
        assert_eq!(p.xsd_path(), Some(Path::new("/opt/schemas/todos.xsd")));
        assert_eq!(p.json_schema().map(JsonSchema::name), Some("Todos"));
    }

    #[test]
    fn registration_does_not_touch_filesystem() {
        let p = EntityProfile::builtin("challenges", Path::new("/does/not/exist")).unwrap();
        assert!(p.xsd_path().is_some());
        assert!(EntityProfile::builtin("users", Path::new("schemas")).is_none());
    }

    #[test]
    fn bare_profile_has_no_schemas() {
        let p = EntityProfile::new("challenger");
        assert!(p.json_schema().is_none());
        assert!(p.xsd_path().is_none());
    }
}
