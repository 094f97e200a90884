use crate::convert::{Converter, geometry};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempPath;
use tokio::process::Command;
use tracing::instrument;

/// ImageMagick's `convert`.
pub const DEFAULT_PROGRAM: &str = "convert";
/// Arguments placed before the geometry: resize and strip profiles in one go.
pub const DEFAULT_ARGS: &[&str] = &["-thumbnail"];
/// Requested mode of converter output, before the umask.
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o666;

/// Runs an external executable once per conversion:
/// `<program> <args…> <N>x<N> <source> <destination>`.
///
/// Output is first written to a hidden temporary file next to the
/// destination (keeping its extension, since ImageMagick chooses the output
/// format from it) and only renamed into place after a zero exit status.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    name: String,
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandConverter {
    /// Use `program` exactly as given; it is not looked up until it runs.
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        Self {
            name,
            program,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve `program` on `PATH` before any conversion is attempted.
    pub fn discover(program: &str, args: impl IntoIterator<Item = impl Into<OsString>>) -> Result<Self> {
        let Ok(path) = which::which(program) else {
            tracing::info!(program, "Thumbnail converter not found in PATH");
            exn::bail!(ErrorKind::ConverterNotFound(program.to_string()));
        };
        tracing::debug!(program, path = %path.display(), "Discovered thumbnail converter");
        Ok(Self::new(path, args))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Reserve a temporary path beside `destination`. Removed on drop unless
    /// persisted.
    ///
    /// The file is created with the mode an ordinary `open(2)` would give it
    /// (subject to the umask), since the converter writes into it rather than
    /// creating the output itself.
    fn stage(destination: &Path) -> Result<TempPath> {
        let directory = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let suffix = destination
            .extension()
            .map(|extension| format!(".{}", extension.to_string_lossy()))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix(".shelf-").suffix(&suffix);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(std::fs::Permissions::from_mode(OUTPUT_MODE));
        }
        let staged = builder
            .tempfile_in(directory)
            .or_raise(|| ErrorKind::TempFile(destination.to_path_buf()))?;
        Ok(staged.into_temp_path())
    }
}

#[async_trait]
impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(converter = %self.name, source = %source.display(), dimension = dimension))]
    async fn convert(&self, source: &Path, destination: &Path, dimension: u32) -> Result<()> {
        let staged = Self::stage(destination)?;
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(geometry(dimension))
            .arg(source)
            .arg(&*staged)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .or_raise(|| ErrorKind::Spawn(self.name.clone()))?;
        if !output.status.success() {
            // `staged` is dropped on the way out, taking any partial output with it.
            exn::bail!(ErrorKind::ExitStatus {
                program: self.name.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        staged
            .persist(destination)
            .map_err(|e| e.error)
            .or_raise(|| ErrorKind::TempFile(destination.to_path_buf()))?;
        tracing::trace!(destination = %destination.display(), "Converter output moved into place");
        Ok(())
    }
}
