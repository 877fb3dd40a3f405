// src/platform.rs

//! Host platform probing: OS build number and native architecture

use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Package architecture tag.
///
/// The tag set is open; unknown tags round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Architecture-independent payload
    Noarch,
    /// 32-bit x86
    Win32,
    /// 64-bit x86
    Amd64,
    /// 64-bit ARM
    Arm64,
    /// Any tag this build does not know about
    Other(String),
}

impl Architecture {
    pub fn as_str(&self) -> &str {
        match self {
            Architecture::Noarch => "noarch",
            Architecture::Win32 => "win32",
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
            Architecture::Other(s) => s,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "noarch" => Architecture::Noarch,
            "win32" => Architecture::Win32,
            "amd64" => Architecture::Amd64,
            "arm64" => Architecture::Arm64,
            other => Architecture::Other(other.to_string()),
        })
    }
}

/// The host as seen by applicability checks
#[derive(Debug, Clone)]
pub struct Platform {
    /// Host OS build number compared against `MinimumOSBuild`
    pub os_build: u64,
    /// Native architecture of this host
    pub native_arch: Architecture,
}

impl Platform {
    /// Probe the running host
    pub fn detect() -> Self {
        let os_build = detect_os_build();
        let native_arch = detect_native_arch();
        debug!("host platform: build {} arch {}", os_build, native_arch);
        Self {
            os_build,
            native_arch,
        }
    }

    /// Architecture preference chain for packages with no requested
    /// architecture: native 64-bit tag first where the host has one, then
    /// the native 32-bit tag, then `noarch`.
    pub fn arch_preference(&self) -> Vec<Architecture> {
        match self.native_arch {
            Architecture::Amd64 => vec![
                Architecture::Amd64,
                Architecture::Win32,
                Architecture::Noarch,
            ],
            Architecture::Arm64 => vec![Architecture::Arm64, Architecture::Noarch],
            Architecture::Win32 => vec![Architecture::Win32, Architecture::Noarch],
            ref other => vec![other.clone(), Architecture::Noarch],
        }
    }
}

/// Derive a comparable build number from the kernel release string.
///
/// `major.minor.patch` maps to `major * 10000 + minor * 100 + patch`, which
/// preserves ordering for the version ranges that occur in practice.
fn detect_os_build() -> u64 {
    let release = match nix::sys::utsname::uname() {
        Ok(info) => info.release().to_string_lossy().into_owned(),
        Err(_) => return 0,
    };
    parse_release(&release)
}

fn parse_release(release: &str) -> u64 {
    let mut parts = release
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().unwrap_or(0));

    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0).min(99);
    major * 10_000 + minor * 100 + patch
}

fn detect_native_arch() -> Architecture {
    match std::env::consts::ARCH {
        "x86_64" => Architecture::Amd64,
        "x86" => Architecture::Win32,
        "aarch64" => Architecture::Arm64,
        other => Architecture::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_round_trip() {
        for tag in ["noarch", "win32", "amd64", "arm64", "riscv64"] {
            let arch: Architecture = tag.parse().unwrap();
            assert_eq!(arch.as_str(), tag);
        }
    }

    #[test]
    fn test_parse_release() {
        assert_eq!(parse_release("6.8.0-45-generic"), 60_800);
        assert_eq!(parse_release("5.15.2"), 51_502);
        assert_eq!(parse_release("garbage"), 0);
    }

    #[test]
    fn test_amd64_preference_chain() {
        let platform = Platform {
            os_build: 60_000,
            native_arch: Architecture::Amd64,
        };
        assert_eq!(
            platform.arch_preference(),
            vec![Architecture::Amd64, Architecture::Win32, Architecture::Noarch]
        );
    }
}
