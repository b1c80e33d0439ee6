//! Host platform tags used to name engine artifacts.
//!
//! Linux tags combine the distro family with the installed OpenSSL line,
//! e.g. `debian-openssl-3.0.x` or `linux-arm64-openssl-1.1.x`.

use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// OpenSSL line assumed when none can be detected.
const DEFAULT_OPENSSL: &str = "1.1.x";

/// Directories probed for `libssl.so.*`.
const LIBSSL_DIRS: &[&str] = &[
    "/lib",
    "/usr/lib",
    "/lib64",
    "/usr/lib64",
    "/lib/x86_64-linux-gnu",
    "/usr/lib/x86_64-linux-gnu",
    "/lib/aarch64-linux-gnu",
    "/usr/lib/aarch64-linux-gnu",
];

static LIBSSL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^libssl\.so\.(\d)(?:\.(\d))?").expect("libssl pattern is valid")
});

/// A platform tag such as `darwin-arm64` or `rhel-openssl-1.1.x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform(String);

impl Platform {
    /// Use an explicit tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Detect the tag for the running host.
    pub fn detect() -> Self {
        let tag = match (env::consts::OS, env::consts::ARCH) {
            ("macos", "aarch64") => "darwin-arm64".to_string(),
            ("macos", _) => "darwin".to_string(),
            ("windows", _) => "windows".to_string(),
            ("linux", arch) => linux_platform_tag(&LinuxHost::probe(arch)),
            (os, _) => os.to_string(),
        };
        debug!(platform = %tag, "detected host platform");
        Self(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_windows(&self) -> bool {
        self.0 == "windows"
    }

    pub fn is_darwin(&self) -> bool {
        self.0.starts_with("darwin")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Linux distro families with distinct engine builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    Rhel,
    Musl,
    Nixos,
    Other,
}

impl DistroFamily {
    /// Classify from the contents of `/etc/os-release`.
    pub fn from_os_release(content: &str) -> Self {
        let ids: Vec<String> = content
            .lines()
            .filter_map(|line| {
                let (key, value) = line.split_once('=')?;
                matches!(key.trim(), "ID" | "ID_LIKE").then(|| value.trim().trim_matches('"').to_ascii_lowercase())
            })
            .flat_map(|value| value.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();

        let has = |names: &[&str]| ids.iter().any(|id| names.contains(&id.as_str()));

        if has(&["nixos"]) {
            DistroFamily::Nixos
        } else if has(&["alpine"]) {
            DistroFamily::Musl
        } else if has(&["debian", "ubuntu", "raspbian"]) {
            DistroFamily::Debian
        } else if has(&["rhel", "centos", "fedora", "amzn", "ol", "rocky", "almalinux"]) {
            DistroFamily::Rhel
        } else {
            DistroFamily::Other
        }
    }
}

/// Facts about a Linux host that decide its platform tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinuxHost {
    pub arch: String,
    pub family: DistroFamily,
    /// OpenSSL line such as `3.0.x`, if one was found.
    pub openssl: Option<String>,
}

impl LinuxHost {
    /// Inspect the running host.
    pub fn probe(arch: &str) -> Self {
        let family = if cfg!(target_env = "musl") {
            DistroFamily::Musl
        } else {
            fs::read_to_string("/etc/os-release")
                .map(|content| DistroFamily::from_os_release(&content))
                .unwrap_or(DistroFamily::Other)
        };

        let names = LIBSSL_DIRS
            .iter()
            .map(Path::new)
            .filter_map(|dir| fs::read_dir(dir).ok())
            .flat_map(|entries| entries.filter_map(Result::ok))
            .map(|entry| entry.file_name().to_string_lossy().into_owned());

        Self {
            arch: arch.to_string(),
            family,
            openssl: openssl_from_file_names(names),
        }
    }
}

/// Pick the newest OpenSSL line among `libssl.so.*` file names.
pub fn openssl_from_file_names<I, S>(names: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .filter_map(|name| {
            let caps = LIBSSL_RE.captures(name.as_ref())?;
            let major: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minor: u32 = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            Some((major, minor))
        })
        .max()
        .map(|(major, minor)| match major {
            3.. => "3.0.x".to_string(),
            _ => format!("{major}.{minor}.x"),
        })
}

/// Build the platform tag for a Linux host.
pub fn linux_platform_tag(host: &LinuxHost) -> String {
    let openssl = host.openssl.as_deref().unwrap_or(DEFAULT_OPENSSL);
    let arm64 = matches!(host.arch.as_str(), "aarch64" | "arm64");

    if host.family == DistroFamily::Nixos {
        return "linux-nixos".to_string();
    }
    if host.arch == "arm" {
        return format!("linux-arm-openssl-{openssl}");
    }

    match (host.family, arm64) {
        (DistroFamily::Musl, true) => format!("linux-musl-arm64-openssl-{openssl}"),
        (_, true) => format!("linux-arm64-openssl-{openssl}"),
        (DistroFamily::Musl, false) if openssl == "3.0.x" => "linux-musl-openssl-3.0.x".to_string(),
        (DistroFamily::Musl, false) => "linux-musl".to_string(),
        (DistroFamily::Rhel, false) => format!("rhel-openssl-{openssl}"),
        (DistroFamily::Debian | DistroFamily::Nixos | DistroFamily::Other, false) => {
            format!("debian-openssl-{openssl}")
        }
    }
}
