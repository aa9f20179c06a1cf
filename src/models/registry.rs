use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::report::ReportKind;

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Programming language a package or repository is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Javascript,
    Rust,
    Python,
    CSharp,
    C,
    Go,
    Php,
    Java,
    Kotlin,
    Unknown,
}

impl Language {
    pub const ALL: [Language; 10] = [
        Language::Javascript,
        Language::Rust,
        Language::Python,
        Language::CSharp,
        Language::C,
        Language::Go,
        Language::Php,
        Language::Java,
        Language::Kotlin,
        Language::Unknown,
    ];

    /// Display name stored in snapshots.
    pub fn name(&self) -> &'static str {
        match self {
            Language::Javascript => "Javascript",
            Language::Rust => "Rust",
            Language::Python => "Python",
            Language::CSharp => "C#",
            Language::C => "C/C++",
            Language::Go => "Go",
            Language::Php => "PHP",
            Language::Java => "Java",
            Language::Kotlin => "Kotlin",
            Language::Unknown => "Unknown",
        }
    }

    /// Repository-name suffixes (after a `-`) that identify the language.
    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            Language::Javascript => &["js", "nestjs"],
            Language::Rust => &["rs", "rust"],
            Language::Python => &["py"],
            Language::CSharp => &["csharp"],
            Language::C => &["clang", "cpp"],
            Language::Go => &["go"],
            Language::Php => &["php"],
            Language::Java => &["java"],
            Language::Kotlin => &["kotlin"],
            Language::Unknown => &["unknown"],
        }
    }

    /// Infer a repository's language.
    ///
    /// A `-<suffix>` in the repository name wins; otherwise the language
    /// reported by the hosting site is used, with TypeScript folded into
    /// Javascript. Anything else is [`Language::Unknown`].
    pub fn infer(repository: &str, reported: Option<&str>) -> Language {
        let by_suffix = Language::ALL.iter().copied().find(|lang| {
            lang.suffixes()
                .iter()
                .any(|suffix| repository.contains(&format!("-{suffix}")))
        });
        if let Some(lang) = by_suffix {
            return lang;
        }

        match reported {
            Some(name) if name.eq_ignore_ascii_case("typescript") => Language::Javascript,
            Some(name) if !name.is_empty() => Language::ALL
                .iter()
                .copied()
                .find(|lang| lang.name().eq_ignore_ascii_case(name))
                .unwrap_or(Language::Unknown),
            _ => Language::Unknown,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// An upstream package registry or hosting site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Registry {
    Npm,
    Cargo,
    Pypi,
    Github,
}

impl Registry {
    pub const ALL: [Registry; 4] = [Registry::Npm, Registry::Cargo, Registry::Pypi, Registry::Github];

    /// Site name used as the snapshot `section_name`.
    pub fn site_name(&self) -> &'static str {
        match self {
            Registry::Npm => "npmjs",
            Registry::Cargo => "crates.io",
            Registry::Pypi => "pypi",
            Registry::Github => "github",
        }
    }

    /// Platform name used by libraries.io.
    pub fn libraries_io_platform(&self) -> &'static str {
        match self {
            Registry::Npm => "NPM",
            Registry::Cargo => "CARGO",
            Registry::Pypi => "PYPI",
            Registry::Github => "GITHUB",
        }
    }

    /// Language every package of this registry is attributed to, if fixed.
    pub fn language(&self) -> Option<Language> {
        match self {
            Registry::Npm => Some(Language::Javascript),
            Registry::Cargo => Some(Language::Rust),
            Registry::Pypi => Some(Language::Python),
            Registry::Github => None,
        }
    }

    /// Report the registry's packages appear in.
    pub fn report(&self) -> ReportKind {
        match self {
            Registry::Github => ReportKind::Green,
            _ => ReportKind::Blue,
        }
    }

    pub fn from_site_name(name: &str) -> Option<Registry> {
        Registry::ALL.iter().copied().find(|r| r.site_name() == name)
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// What produced a package's activity: a registry or a user-agent group.
///
/// Serialized as the bare site name (`"npmjs"`, `"github"`, ...) or the
/// user-agent group identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Registry(Registry),
    UserAgent(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Registry(registry) => registry.site_name(),
            Source::UserAgent(group) => group,
        }
    }

    pub fn parse(value: &str) -> Source {
        Registry::from_site_name(value)
            .map(Source::Registry)
            .unwrap_or_else(|| Source::UserAgent(value.to_string()))
    }

    pub fn registry(&self) -> Option<Registry> {
        match self {
            Source::Registry(registry) => Some(*registry),
            Source::UserAgent(_) => None,
        }
    }
}

impl Default for Source {
    fn default() -> Self {
        Source::UserAgent(String::new())
    }
}

impl From<Registry> for Source {
    fn from(registry: Registry) -> Self {
        Source::Registry(registry)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Source::parse(&raw))
    }
}
