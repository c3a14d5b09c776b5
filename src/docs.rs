//! README retrieval for a resolved entry.
//!
//! A thin collaborator of the query tool: given an entry's GitHub URL, probe
//! the raw content host for a README. Misses and network failures simply
//! yield `None`; documentation is a nice-to-have, never a failure mode.

use tracing::debug;

/// Candidate raw-README URLs for a GitHub repository or subtree URL.
///
/// Handles both plain repository links (`github.com/owner/repo`) and tree
/// links into a subdirectory (`github.com/owner/repo/tree/<branch>/<path>`).
/// Returns an empty list for non-GitHub URLs.
pub fn readme_candidates(url: &str) -> Vec<String> {
    let rest = url
        .trim_end_matches('/')
        .strip_prefix("https://github.com/")
        .or_else(|| url.trim_end_matches('/').strip_prefix("http://github.com/"));
    let Some(rest) = rest else {
        return Vec::new();
    };

    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Vec::new();
    }
    let owner = parts[0];
    let repo = parts[1];

    let mut locations: Vec<(String, String)> = Vec::new();
    if parts.len() >= 4 && parts[2] == "tree" {
        // Subtree link carries its own branch; look in the subdirectory
        // first, then at the repository root.
        let branch = parts[3].to_string();
        let subpath = parts[4..].join("/");
        if !subpath.is_empty() {
            locations.push((branch.clone(), subpath));
        }
        locations.push((branch, String::new()));
    } else {
        locations.push(("main".to_string(), String::new()));
        locations.push(("master".to_string(), String::new()));
    }

    let mut candidates = Vec::new();
    for (branch, subpath) in locations {
        for file in ["README.md", "readme.md"] {
            let path = if subpath.is_empty() {
                file.to_string()
            } else {
                format!("{}/{}", subpath, file)
            };
            candidates.push(format!(
                "https://raw.githubusercontent.com/{}/{}/{}/{}",
                owner, repo, branch, path
            ));
        }
    }
    candidates
}

/// Fetch README text for an entry URL, trying each candidate location.
pub async fn fetch_readme(client: &reqwest::Client, url: &str) -> Option<String> {
    for candidate in readme_candidates(url) {
        match client.get(&candidate).send().await {
            Ok(response) if response.status().is_success() => {
                match response.text().await {
                    Ok(text) if !text.trim().is_empty() => {
                        debug!(url = candidate, "fetched readme");
                        return Some(text);
                    }
                    _ => continue,
                }
            }
            Ok(_) => continue,
            Err(e) => {
                debug!(url = candidate, error = %e, "readme probe failed");
                continue;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_repo_probes_main_and_master() {
        let candidates = readme_candidates("https://github.com/example/mcp-weather");
        assert_eq!(
            candidates,
            vec![
                "https://raw.githubusercontent.com/example/mcp-weather/main/README.md",
                "https://raw.githubusercontent.com/example/mcp-weather/main/readme.md",
                "https://raw.githubusercontent.com/example/mcp-weather/master/README.md",
                "https://raw.githubusercontent.com/example/mcp-weather/master/readme.md",
            ]
        );
    }

    #[test]
    fn tree_url_probes_subdirectory_first() {
        let candidates = readme_candidates(
            "https://github.com/modelcontextprotocol/servers/tree/main/src/fetch",
        );
        assert_eq!(
            candidates[0],
            "https://raw.githubusercontent.com/modelcontextprotocol/servers/main/src/fetch/README.md"
        );
        assert!(candidates
            .iter()
            .any(|c| c.ends_with("/servers/main/README.md")));
    }

    #[test]
    fn non_github_urls_have_no_candidates() {
        assert!(readme_candidates("https://example.com/thing").is_empty());
        assert!(readme_candidates("https://gitlab.com/a/b").is_empty());
        assert!(readme_candidates("https://github.com/only-owner").is_empty());
    }
}
