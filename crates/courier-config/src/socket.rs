//! Deterministic location of the kernel's Unix domain socket.
//!
//! The socket lives at `<base>/<namespace>/kernel.sock`. The base is the
//! first existing directory among `$XDG_RUNTIME_DIR`, `$TMPDIR` and
//! [`FALLBACK_BASE_DIRECTORY`]. Temp bases are shared between users, so the
//! namespace there carries the effective uid.

use std::ffi::OsString;
use std::fmt;
use std::fs::DirBuilder;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// File name of the kernel socket inside the namespace directory.
pub const SOCKET_FILE_NAME: &str = "kernel.sock";

/// Namespace directory created beneath the base directory.
pub const NAMESPACE: &str = "courier";

/// Base directory used when neither environment variable is usable.
pub const FALLBACK_BASE_DIRECTORY: &str = "/tmp";

const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";
const TEMP_DIR_ENV: &str = "TMPDIR";

/// How a socket path was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOrigin {
    /// Derived by the [`SocketLocator`]; the kernel owns its directory.
    Located,
    /// Supplied by the operator; existing parents are left untouched.
    Explicit,
}

/// A resolved socket path together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketPath {
    path: Utf8PathBuf,
    origin: SocketOrigin,
}

impl SocketPath {
    /// Wraps an operator-supplied path.
    #[must_use]
    pub fn explicit(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: SocketOrigin::Explicit,
        }
    }

    /// Wraps a path derived by the locator.
    #[must_use]
    pub fn located(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: SocketOrigin::Located,
        }
    }

    /// Socket file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Where the path came from.
    #[must_use]
    pub const fn origin(&self) -> SocketOrigin {
        self.origin
    }

    /// Ensures the socket's parent directory exists with owner-only
    /// permissions.
    ///
    /// Directories created here get mode `0700`. For located sockets an
    /// existing namespace directory that is group- or world-writable is
    /// tightened back to `0700`.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the directory cannot be
    /// created, inspected or restricted.
    pub fn prepare_directory(&self) -> Result<(), SocketPreparationError> {
        let Some(parent) = self.path.parent().filter(|parent| !parent.as_str().is_empty()) else {
            return Err(SocketPreparationError::MissingParent {
                path: self.path.clone(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        if self.origin == SocketOrigin::Located {
            restrict_directory(parent)?;
        }
        Ok(())
    }
}

impl fmt::Display for SocketPath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.path)
    }
}

#[cfg(unix)]
fn restrict_directory(directory: &Utf8Path) -> Result<(), SocketPreparationError> {
    use std::fs::{self, Permissions};
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let metadata =
        fs::metadata(directory.as_std_path()).map_err(|source| SocketPreparationError::Inspect {
            path: directory.to_path_buf(),
            source,
        })?;
    if !metadata.is_dir() {
        return Err(SocketPreparationError::NotADirectory {
            path: directory.to_path_buf(),
        });
    }
    let uid = effective_uid();
    if metadata.uid() != uid {
        return Err(SocketPreparationError::ForeignOwner {
            path: directory.to_path_buf(),
            owner: metadata.uid(),
            uid,
        });
    }
    if metadata.mode() & 0o022 != 0 {
        fs::set_permissions(directory.as_std_path(), Permissions::from_mode(0o700)).map_err(
            |source| SocketPreparationError::Restrict {
                path: directory.to_path_buf(),
                source,
            },
        )?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_directory(_directory: &Utf8Path) -> Result<(), SocketPreparationError> {
    Ok(())
}

/// Computes the default socket path from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketLocator {
    runtime_dir: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    fallback: PathBuf,
    uid: u32,
}

impl SocketLocator {
    /// Builds a locator from the live process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_lookup(|key| std::env::var_os(key))
    }

    /// Builds a locator that reads variables through `lookup`.
    ///
    /// Unset and empty variables are ignored.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let read = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };
        Self {
            runtime_dir: read(RUNTIME_DIR_ENV),
            temp_dir: read(TEMP_DIR_ENV),
            fallback: PathBuf::from(FALLBACK_BASE_DIRECTORY),
            uid: effective_uid(),
        }
    }

    /// Replaces the fixed fallback directory.
    #[must_use]
    pub fn with_fallback(mut self, directory: impl Into<PathBuf>) -> Self {
        self.fallback = directory.into();
        self
    }

    /// Resolves the socket path.
    ///
    /// # Errors
    ///
    /// Returns [`SocketLocatorError::NoBaseDirectory`] when no candidate
    /// exists, or [`SocketLocatorError::NonUtf8`] when the chosen base is not
    /// valid UTF-8.
    pub fn locate(&self) -> Result<SocketPath, SocketLocatorError> {
        let candidates = [
            (self.runtime_dir.as_ref(), false),
            (self.temp_dir.as_ref(), true),
            (Some(&self.fallback), true),
        ];
        let (base, shared) = candidates
            .into_iter()
            .find_map(|(dir, shared)| dir.filter(|dir| dir.is_dir()).map(|dir| (dir, shared)))
            .ok_or(SocketLocatorError::NoBaseDirectory)?;

        let mut path = Utf8PathBuf::from_path_buf(base.clone())
            .map_err(|path| SocketLocatorError::NonUtf8 { path })?;
        if shared {
            path.push(format!("{NAMESPACE}-uid-{}", self.uid));
        } else {
            path.push(NAMESPACE);
        }
        path.push(SOCKET_FILE_NAME);
        Ok(SocketPath::located(path))
    }
}

#[cfg(unix)]
fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

#[cfg(not(unix))]
const fn effective_uid() -> u32 {
    0
}

/// Errors raised while locating the socket.
#[derive(Debug, Error)]
pub enum SocketLocatorError {
    /// None of the candidate base directories exist.
    #[error("no usable base directory for the kernel socket")]
    NoBaseDirectory,
    /// The chosen base directory is not valid UTF-8.
    #[error("socket base directory '{}' is not valid UTF-8", path.display())]
    NonUtf8 {
        /// Offending directory.
        path: PathBuf,
    },
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Parent directory is missing when creating a Unix socket path.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Socket path.
        path: Utf8PathBuf,
    },
    /// Failed to create socket directories.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory being created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to read directory metadata.
    #[error("failed to inspect socket directory '{path}': {source}")]
    Inspect {
        /// Directory being inspected.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The socket parent exists but is not a directory.
    #[error("socket parent '{path}' is not a directory")]
    NotADirectory {
        /// Offending path.
        path: Utf8PathBuf,
    },
    /// The namespace directory belongs to another user.
    #[error("socket directory '{path}' is owned by uid {owner}, expected {uid}")]
    ForeignOwner {
        /// Directory path.
        path: Utf8PathBuf,
        /// Owner recorded on disk.
        owner: u32,
        /// Effective uid of this process.
        uid: u32,
    },
    /// Tightening directory permissions failed.
    #[error("failed to restrict permissions on '{path}': {source}")]
    Restrict {
        /// Directory path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
