//! Static per-ecosystem search parameters.
//!
//! Every supported ecosystem is one immutable [`OrganizationConfig`] in
//! [`ORGANIZATIONS`]. Configurations are looked up by name and passed to the
//! gathering functions explicitly.

use std::fmt;

use crate::config::{CRATES_API_URL, GITHUB_PAGE_SIZE, GITHUB_SEARCH_URL, NPM_SEARCH_URL, PYPI_SEARCH_URL};
use crate::error::{Result, UsageError};
use crate::models::Registry;

/// Search parameters for one ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrganizationConfig {
    pub name: &'static str,
    pub npm_include: &'static str,
    pub crates_include: &'static str,
    pub pypi_include: &'static str,
    pub github_include: &'static str,
    pub github_exclude: &'static str,
    /// The ecosystem's main account on the code-hosting site.
    pub github_account: &'static str,
    /// Further accounts whose repositories count as the ecosystem's own.
    pub affiliated_accounts: &'static [&'static str],
    /// Included by default when gathering every organization.
    pub gather_data: bool,
    /// Warnings are shown in reports for this organization.
    pub report_warnings: bool,
    /// Our own ecosystem: repository traffic and access logs are readable.
    pub own_organization: bool,
}

pub const MULTIVERSX: OrganizationConfig = OrganizationConfig {
    name: "Multiversx",
    npm_include: "@multiversx/sdk",
    crates_include: "multiversx",
    pypi_include: "multiversx-sdk",
    github_include: "sdk",
    github_exclude: "deprecated",
    github_account: "multiversx",
    affiliated_accounts: &[],
    gather_data: true,
    report_warnings: true,
    own_organization: true,
};

pub const SOLANA: OrganizationConfig = OrganizationConfig {
    name: "Solana",
    npm_include: "@solana",
    crates_include: "solana",
    pypi_include: "solana",
    github_include: "",
    github_exclude: "deprecated",
    github_account: "solana-labs",
    affiliated_accounts: &["anza-xyz", "michaelhly"],
    gather_data: true,
    report_warnings: false,
    own_organization: false,
};

pub const NEAR: OrganizationConfig = OrganizationConfig {
    name: "Near",
    npm_include: "near-",
    crates_include: "near-",
    pypi_include: "near",
    github_include: "near",
    github_exclude: "deprecated",
    github_account: "near",
    affiliated_accounts: &[],
    gather_data: true,
    report_warnings: false,
    own_organization: false,
};

pub const AVALANCHE: OrganizationConfig = OrganizationConfig {
    name: "Avalanche",
    npm_include: "@avalabs/",
    crates_include: "avalanche",
    pypi_include: "avalanche",
    github_include: "",
    github_exclude: "deprecated",
    github_account: "ava-labs",
    affiliated_accounts: &[],
    gather_data: true,
    report_warnings: false,
    own_organization: false,
};

/// Every supported ecosystem, in report order.
pub const ORGANIZATIONS: [OrganizationConfig; 4] = [MULTIVERSX, SOLANA, NEAR, AVALANCHE];

/// Find an organization by name, ignoring case.
pub fn lookup(name: &str) -> Result<OrganizationConfig> {
    ORGANIZATIONS
        .iter()
        .copied()
        .find(|org| org.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| UsageError::NotFound(format!("organization '{name}'")))
}

/// Organizations flagged for gathering.
pub fn gathered() -> impl Iterator<Item = OrganizationConfig> {
    ORGANIZATIONS.into_iter().filter(|org| org.gather_data)
}

impl OrganizationConfig {
    /// Name pattern a candidate must contain for `registry`.
    pub fn search_include(&self, registry: Registry) -> &'static str {
        match registry {
            Registry::Npm => self.npm_include,
            Registry::Cargo => self.crates_include,
            Registry::Pypi => self.pypi_include,
            Registry::Github => self.github_include,
        }
    }

    /// Name pattern excluded from the search for `registry`, if any.
    pub fn search_exclude(&self, registry: Registry) -> Option<&'static str> {
        match registry {
            Registry::Github if !self.github_exclude.is_empty() => Some(self.github_exclude),
            _ => None,
        }
    }

    /// Main account followed by the affiliated ones.
    pub fn accounts(&self) -> impl Iterator<Item = &'static str> {
        let affiliated: &'static [&'static str] = self.affiliated_accounts;
        std::iter::once(self.github_account).chain(affiliated.iter().copied())
    }

    /// Whether a repository URL points into one of this organization's accounts.
    pub fn owns_repository(&self, repository_url: &str) -> bool {
        let url = repository_url.to_ascii_lowercase();
        self.accounts().any(|account| {
            url.contains(&format!("github.com/{}/", account.to_ascii_lowercase()))
        })
    }

    /// Inclusion filter applied to every search candidate.
    ///
    /// The name must contain the registry's include pattern. When
    /// `ownership_required` is set the repository link must be present and
    /// owned; otherwise a present link must still be owned.
    pub fn accepts(
        &self,
        registry: Registry,
        name: &str,
        repository_url: Option<&str>,
        ownership_required: bool,
    ) -> bool {
        if !name.contains(self.search_include(registry)) {
            return false;
        }
        match repository_url {
            Some(url) if !url.is_empty() => self.owns_repository(url),
            _ => !ownership_required,
        }
    }

    /// Paginated search URL for `registry`.
    ///
    /// `page` is zero-based for npm and crates.io (turned into an offset) and
    /// one-based for PyPI and GitHub, matching each site's paging.
    pub fn search_url(&self, registry: Registry, page: usize, page_size: usize) -> String {
        let pattern = self.search_include(registry);
        match registry {
            Registry::Npm => format!(
                "{NPM_SEARCH_URL}?text={pattern}&size={page_size}&from={}",
                page * page_size
            ),
            Registry::Cargo => format!(
                "{CRATES_API_URL}?q={pattern}&size={page_size}&from={}",
                page * page_size
            ),
            Registry::Pypi => format!("{PYPI_SEARCH_URL}?q={pattern}&page={page}"),
            Registry::Github => self.github_search_url(page),
        }
    }

    /// Repository search restricted to the organization's main account.
    pub fn github_search_url(&self, page: usize) -> String {
        self.github_search_url_for(self.github_account, page)
    }

    /// Repository search restricted to `account`.
    pub fn github_search_url_for(&self, account: &str, page: usize) -> String {
        let exclude = self.search_exclude(Registry::Github).unwrap_or_default();
        format!(
            "{GITHUB_SEARCH_URL}?q={}+in:name-{exclude}+in:name+user:{account}&per_page={GITHUB_PAGE_SIZE}&page={page}&sort=stars&order=desc",
            self.github_include
        )
    }
}

impl fmt::Display for OrganizationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
