// rust/tracker-core/src/platform.rs

//! Platform detection for selecting per-platform native artifacts.
//!
//! Native libraries are bundled under `/lib/<os>/<arch>/`, e.g.
//! `/lib/linux/x86_64/libxgboost4j.so`.

use std::fmt;

use crate::error::{Result, TrackerError};

/// Root under which native libraries are bundled.
pub const NATIVE_RESOURCE_ROOT: &str = "/lib";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    MacOs,
    Windows,
    Linux,
    Solaris,
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Solaris => "solaris",
        }
    }

    /// Match an OS name loosely, e.g. "Mac OS X", "darwin", "Windows 10".
    pub fn from_name(name: &str) -> Result<Self> {
        let os = name.to_lowercase();
        if os.contains("mac") || os.contains("darwin") {
            Ok(Self::MacOs)
        } else if os.contains("win") {
            Ok(Self::Windows)
        } else if os.contains("nux") {
            Ok(Self::Linux)
        } else if os.contains("sunos") || os.contains("solaris") {
            Ok(Self::Solaris)
        } else {
            Err(TrackerError::unsupported_os(name))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
    Sparc,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Sparc => "sparc",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let arch = name.to_lowercase();
        if arch.starts_with("amd64") || arch.starts_with("x86_64") {
            Ok(Self::X86_64)
        } else if arch.starts_with("aarch64") || arch.starts_with("arm64") {
            Ok(Self::Aarch64)
        } else if arch.starts_with("sparc") {
            Ok(Self::Sparc)
        } else {
            Err(TrackerError::unsupported_arch(name))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    /// Describe the platform this binary was built for.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedPlatform` outside {macos, windows, linux, solaris}
    /// x {x86_64, aarch64, sparc}.
    pub fn describe() -> Result<Self> {
        Self::from_names(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_names(os: &str, arch: &str) -> Result<Self> {
        Ok(Self {
            os: Os::from_name(os)?,
            arch: Arch::from_name(arch)?,
        })
    }

    /// File name of a native library on this platform, e.g. `libfoo.so`.
    pub fn library_file_name(&self, name: &str) -> String {
        match self.os {
            Os::Windows => format!("{name}.dll"),
            Os::MacOs => format!("lib{name}.dylib"),
            Os::Linux | Os::Solaris => format!("lib{name}.so"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os.as_str(), self.arch.as_str())
    }
}

/// Bundled resource path of native library `name` for the current platform.
pub fn native_library_resource(name: &str) -> Result<String> {
    let platform = Platform::describe().map_err(|e| {
        tracing::error!(library = name, error = %e, "cannot select native library");
        e
    })?;
    Ok(library_resource_for(&platform, name))
}

fn library_resource_for(platform: &Platform, name: &str) -> String {
    format!(
        "{NATIVE_RESOURCE_ROOT}/{platform}/{}",
        platform.library_file_name(name)
    )
}
