/// Reference resolution for `<ref prompt="...">` tags
///
/// Prompt paths are logical, slash-separated names. A reference is resolved
/// relative to the directory of the prompt that contains it; a leading `/`
/// makes it relative to the root instead.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::error::ResolveError;

/// A referenced prompt, as found by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    /// Canonical path of the prompt; used to detect cycles and as the
    /// base for references inside it.
    pub path: String,
    pub content: String,
}

/// Source of referenced prompts.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Find the prompt `path` refers to, as seen from the prompt at `from`.
    async fn resolve(&self, path: &str, from: Option<&str>) -> Result<Option<ResolvedPrompt>, ResolveError>;
}

/// Join a reference path onto the directory of `from` and normalise it.
pub fn join_path(path: &str, from: Option<&str>) -> String {
    let mut segments: Vec<&str> = Vec::new();
    if !path.starts_with('/') {
        if let Some(from) = from {
            segments.extend(from.split('/').filter(|s| !s.is_empty()));
            // Drop the file name of the referencing prompt
            segments.pop();
        }
    }

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            name => segments.push(name),
        }
    }
    segments.join("/")
}

/// Prompts held in memory, keyed by canonical path.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    prompts: HashMap<String, String>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = join_path(&path.into(), None);
        self.prompts.insert(path, content.into());
    }
}

#[async_trait]
impl ReferenceResolver for MapResolver {
    async fn resolve(&self, path: &str, from: Option<&str>) -> Result<Option<ResolvedPrompt>, ResolveError> {
        let full_path = join_path(path, from);
        Ok(self.prompts.get(&full_path).map(|content| ResolvedPrompt {
            path: full_path,
            content: content.clone(),
        }))
    }
}

/// Prompts stored as `.promptl` files under a root directory.
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

pub const PROMPT_EXTENSION: &str = "promptl";

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The file a normalised prompt path is read from.
    pub fn file_path(&self, full_path: &str) -> PathBuf {
        let mut file = self.root.join(full_path);
        if file.extension().is_none() {
            file.set_extension(PROMPT_EXTENSION);
        }
        file
    }
}

#[async_trait]
impl ReferenceResolver for FsResolver {
    async fn resolve(&self, path: &str, from: Option<&str>) -> Result<Option<ResolvedPrompt>, ResolveError> {
        let full_path = join_path(path, from);
        if full_path.is_empty() {
            return Err(ResolveError::InvalidPath {
                path: path.to_string(),
                reason: "path points at the prompt root".to_string(),
            });
        }

        let file = self.file_path(&full_path);
        debug!(path = %full_path, file = %file.display(), "reading referenced prompt");
        match tokio::fs::read_to_string(&file).await {
            Ok(content) => Ok(Some(ResolvedPrompt {
                path: full_path,
                content,
            })),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("child", None), "child");
        assert_eq!(join_path("child", Some("dir/parent")), "dir/child");
        assert_eq!(join_path("../shared/x", Some("a/b/parent")), "a/shared/x");
        assert_eq!(join_path("/top", Some("a/b/parent")), "top");
        assert_eq!(join_path("./same", Some("parent")), "same");
    }

    #[tokio::test]
    async fn test_map_resolver() {
        let resolver = MapResolver::new().with_prompt("dir/child", "hello");
        let found = resolver.resolve("child", Some("dir/parent")).await.unwrap();
        assert_eq!(
            found,
            Some(ResolvedPrompt {
                path: "dir/child".into(),
                content: "hello".into()
            })
        );
        assert_eq!(resolver.resolve("missing", None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fs_resolver() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("shared")).unwrap();
        std::fs::write(dir.path().join("shared/footer.promptl"), "Bye").unwrap();

        let resolver = FsResolver::new(dir.path());
        let found = resolver.resolve("../shared/footer", Some("prompts/main")).await.unwrap();
        assert_eq!(found.map(|p| (p.path, p.content)), Some(("shared/footer".into(), "Bye".into())));
        assert_eq!(resolver.resolve("nope", None).await.unwrap(), None);
    }
}
