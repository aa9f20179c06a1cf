//! Organization lookup, candidate filters and search URLs.

use usage_analytics::organization::{self, AVALANCHE, MULTIVERSX, ORGANIZATIONS, SOLANA};
use usage_analytics::{Registry, UsageError};

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[test]
fn lookup_ignores_case() {
    assert_eq!(organization::lookup("multiversx").unwrap(), MULTIVERSX);
    assert_eq!(organization::lookup(" SOLANA ").unwrap(), SOLANA);
    assert!(matches!(organization::lookup("cardano"), Err(UsageError::NotFound(_))));
}

#[test]
fn only_our_own_organization_reads_private_data() {
    let own: Vec<&str> = ORGANIZATIONS.iter().filter(|o| o.own_organization).map(|o| o.name).collect();
    assert_eq!(own, vec!["Multiversx"]);
    assert_eq!(organization::gathered().count(), ORGANIZATIONS.len());
}

// ---------------------------------------------------------------------------
// Candidate filters
// ---------------------------------------------------------------------------

#[test]
fn accounts_include_affiliates() {
    let accounts: Vec<&str> = SOLANA.accounts().collect();
    assert_eq!(accounts, vec!["solana-labs", "anza-xyz", "michaelhly"]);
    assert!(SOLANA.owns_repository("https://github.com/anza-xyz/agave"));
    assert!(SOLANA.owns_repository("git+https://GitHub.com/Solana-Labs/solana-web3.js.git"));
    assert!(!SOLANA.owns_repository("https://github.com/someone/solana-fork"));
}

#[test]
fn ownership_required_rejects_missing_links() {
    assert!(MULTIVERSX.accepts(Registry::Cargo, "multiversx-sc", Some("https://github.com/multiversx/mx-sdk-rs"), true));
    assert!(!MULTIVERSX.accepts(Registry::Cargo, "multiversx-sc", None, true));
    assert!(!MULTIVERSX.accepts(Registry::Cargo, "multiversx-sc", Some("https://github.com/elsewhere/x"), true));
    assert!(!MULTIVERSX.accepts(Registry::Cargo, "elrond-wasm", Some("https://github.com/multiversx/x"), true));
}

#[test]
fn optional_ownership_still_rejects_foreign_links() {
    assert!(MULTIVERSX.accepts(Registry::Npm, "@multiversx/sdk-core", None, false));
    assert!(MULTIVERSX.accepts(Registry::Npm, "@multiversx/sdk-core", Some(""), false));
    assert!(!MULTIVERSX.accepts(Registry::Npm, "@multiversx/sdk-core", Some("https://github.com/typosquat/sdk"), false));
}

// ---------------------------------------------------------------------------
// Search URLs
// ---------------------------------------------------------------------------

#[test]
fn registry_search_urls_page_by_offset() {
    assert_eq!(
        MULTIVERSX.search_url(Registry::Npm, 2, 20),
        "https://registry.npmjs.org/-/v1/search?text=@multiversx/sdk&size=20&from=40"
    );
    assert_eq!(
        MULTIVERSX.search_url(Registry::Cargo, 0, 20),
        "https://crates.io/api/v1/crates?q=multiversx&size=20&from=0"
    );
    assert_eq!(
        MULTIVERSX.search_url(Registry::Pypi, 1, 0),
        "https://pypi.org/search/?q=multiversx-sdk&page=1"
    );
}

#[test]
fn github_search_is_scoped_to_an_account() {
    assert_eq!(
        MULTIVERSX.github_search_url(1),
        "https://api.github.com/search/repositories?q=sdk+in:name-deprecated+in:name+user:multiversx&per_page=100&page=1&sort=stars&order=desc"
    );
    assert!(AVALANCHE.github_search_url_for("ava-labs", 2).contains("user:ava-labs&per_page=100&page=2"));
    assert_eq!(MULTIVERSX.search_exclude(Registry::Github), Some("deprecated"));
    assert_eq!(MULTIVERSX.search_exclude(Registry::Npm), None);
}
