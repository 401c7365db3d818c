use std::{io, path::Path};

pub mod path {
    use etcetera::home_dir;
    use std::{
        borrow::Cow,
        path::{Component, Path},
    };

    /// Expands tilde `~` into users home directory if available, otherwise returns the path
    /// unchanged. The tilde will only be expanded when present as the first component of the path
    /// and only slash follows it.
    pub fn expand_tilde<'a, P>(path: P) -> Cow<'a, Path>
    where
        P: Into<Cow<'a, Path>>,
    {
        let path = path.into();
        let mut components = path.components();
        if let Some(Component::Normal(c)) = components.next() {
            if c == "~" {
                if let Ok(mut buf) = home_dir() {
                    buf.push(components);
                    return Cow::Owned(buf);
                }
            }
        }

        path
    }

    /// Renders `path` with exactly one trailing separator, so rsync copies the
    /// directory contents rather than the directory itself.
    pub fn with_trailing_slash(path: &Path) -> String {
        let rendered = path.to_string_lossy();
        let trimmed = rendered.trim_end_matches(['/', '\\']);
        format!("{}/", trimmed)
    }
}

/// Creates `path` and its parents if it does not exist yet.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o750);
    }
    builder.create(path)
}

pub fn ensure_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).ok();
        }
    }
}
