//! Per-invocation staging area
//!
//! Every call gets its own temporary directory, removed when the value drops

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::AssembleError;

const SOURCE_FILE_NAME: &str = "input.S";
const ARTIFACT_EXTENSION: &str = "o";

pub struct StagingArea {
    dir: TempDir,
    source: PathBuf,
    artifact: PathBuf,
}

impl StagingArea {
    /// Create a fresh directory (under `parent`, or the system temp dir) and
    /// write `text` verbatim into its source file.
    pub async fn create(parent: Option<&Path>, text: &str) -> Result<Self, AssembleError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("asm-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
        .map_err(AssembleError::Staging)?;

        let source = dir.path().join(SOURCE_FILE_NAME);
        let artifact = source.with_extension(ARTIFACT_EXTENSION);

        tokio::fs::write(&source, text)
            .await
            .map_err(AssembleError::Staging)?;

        Ok(Self {
            dir,
            source,
            artifact,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }

    /// Replace every literal occurrence of the staging paths in `diagnostics`.
    ///
    /// The source path becomes `placeholder`, the artifact path becomes the
    /// placeholder with the artifact extension.
    pub fn sanitize(&self, diagnostics: &str, placeholder: &str) -> String {
        let artifact_placeholder = Path::new(placeholder).with_extension(ARTIFACT_EXTENSION);
        let replaced = replace_path(diagnostics, &self.source, placeholder);
        replace_path(
            &replaced,
            &self.artifact,
            &artifact_placeholder.to_string_lossy(),
        )
        .into_owned()
    }
}

fn replace_path<'a>(text: &'a str, path: &Path, with: &str) -> Cow<'a, str> {
    let needle = path.to_string_lossy();
    if needle.is_empty() || !text.contains(needle.as_ref()) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace(needle.as_ref(), with))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writes_source_verbatim() {
        let parent = tempfile::tempdir().unwrap();
        let text = "  .text\nmov r0, r1\n\n";
        let staging = StagingArea::create(Some(parent.path()), text).await.unwrap();

        assert!(staging.dir_path().starts_with(parent.path()));
        assert_eq!(std::fs::read_to_string(staging.source_path()).unwrap(), text);
        assert_eq!(
            staging.artifact_path(),
            staging.dir_path().join("input.o").as_path()
        );
    }

    #[tokio::test]
    async fn test_each_call_gets_its_own_directory() {
        let parent = tempfile::tempdir().unwrap();
        let a = StagingArea::create(Some(parent.path()), "a").await.unwrap();
        let b = StagingArea::create(Some(parent.path()), "b").await.unwrap();

        assert_ne!(a.source_path(), b.source_path());
        assert_eq!(std::fs::read_to_string(a.source_path()).unwrap(), "a");
        assert_eq!(std::fs::read_to_string(b.source_path()).unwrap(), "b");
    }

    #[tokio::test]
    async fn test_directory_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let staging = StagingArea::create(Some(parent.path()), "nop").await.unwrap();
        let dir = staging.dir_path().to_path_buf();
        assert!(dir.exists());

        drop(staging);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_missing_parent_is_staging_error() {
        let parent = tempfile::tempdir().unwrap();
        let missing = parent.path().join("nope");
        let result = StagingArea::create(Some(&missing), "nop").await;
        assert!(matches!(result, Err(AssembleError::Staging(_))));
    }

    #[tokio::test]
    async fn test_sanitize_rewrites_paths() {
        let staging = StagingArea::create(None, "nop").await.unwrap();
        let src = staging.source_path().display().to_string();
        let obj = staging.artifact_path().display().to_string();
        let diagnostics = format!(
            "{src}: Assembler messages:\n{src}:1: Error: bad instruction `x'\ncannot write {obj}\n"
        );

        let clean = staging.sanitize(&diagnostics, "input.S");
        assert!(!clean.contains(&src));
        assert!(!clean.contains(&obj));
        assert_eq!(
            clean,
            "input.S: Assembler messages:\ninput.S:1: Error: bad instruction `x'\ncannot write input.o\n"
        );
    }

    #[tokio::test]
    async fn test_sanitize_leaves_unrelated_text() {
        let staging = StagingArea::create(None, "nop").await.unwrap();
        assert_eq!(staging.sanitize("all good", "input.S"), "all good");
    }
}
