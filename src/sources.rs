//! Listing sources and their format-specific parsers.
//!
//! Each source fetches one public server listing (a markdown README with
//! heading-delimited categories) and turns it into [`ServerEntry`] values.
//! Parsing is recoverable per row: a malformed line yields [`RowParse::Skip`]
//! and never fails the batch. Every source stamps its own provenance label
//! onto the entries it emits; the aggregator merges labels across sources.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use crate::models::ServerEntry;

/// Base for resolving relative `src/…` links in the official listing.
const OFFICIAL_REPO_BASE: &str = "https://github.com/modelcontextprotocol/servers/tree/main";

/// Outcome of parsing one listing row.
///
/// Skips carry no payload: row-level failures are control flow, not errors.
#[derive(Debug)]
pub enum RowParse {
    Entry(ServerEntry),
    Skip,
}

/// A remote listing of MCP servers.
///
/// `fetch` and `parse` are split so parsers can be tested offline against
/// captured listing text.
#[async_trait]
pub trait ServerSource: Send + Sync {
    /// Human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Provenance label stamped on every emitted entry.
    fn label(&self) -> &str;

    /// Location of the raw listing text.
    fn url(&self) -> &str;

    /// Parse raw listing text into entries, skipping malformed rows.
    fn parse(&self, content: &str) -> Vec<ServerEntry>;

    /// Fetch the raw listing text.
    async fn fetch(&self, client: &reqwest::Client) -> Result<String> {
        let response = client
            .get(self.url())
            .send()
            .await
            .with_context(|| format!("failed to fetch listing from {}", self.name()))?
            .error_for_status()
            .with_context(|| format!("listing fetch rejected by {}", self.name()))?;
        Ok(response.text().await?)
    }

    /// Fetch and parse. A fetch error propagates so the caller can count
    /// this source as failed for the cycle; parse errors never do.
    async fn entries(&self, client: &reqwest::Client) -> Result<Vec<ServerEntry>> {
        info!(source = self.name(), "fetching server listing");
        let content = self.fetch(client).await?;
        let entries = self.parse(&content);
        info!(source = self.name(), count = entries.len(), "parsed listing");
        Ok(entries)
    }
}

/// All configured sources, in aggregation order.
pub fn all_sources() -> Vec<Box<dyn ServerSource>> {
    vec![
        Box::new(OfficialSource::new()),
        Box::new(PunkpeyeAwesomeSource::new()),
        Box::new(AppcypherAwesomeSource::new()),
    ]
}

/// Collapse runs of whitespace and trim.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============ Official listing ============

/// The `modelcontextprotocol/servers` README.
///
/// Fixed category sections (`reference`, `archived`, `official`,
/// `community`); rows look like `- **[Name](url)** - Description`, sometimes
/// prefixed with an `<img>` logo tag.
pub struct OfficialSource {
    img_re: Regex,
    row_re: Regex,
}

impl OfficialSource {
    pub fn new() -> Self {
        Self {
            img_re: Regex::new(r"<img[^>]*?>").unwrap(),
            row_re: Regex::new(r"-\s*\*\*\[([^\]]+)\]\(([^)]+)\)\*\*\s*-\s*(.+)").unwrap(),
        }
    }

    fn parse_row(&self, line: &str, category: &str) -> RowParse {
        let clean = self.img_re.replace_all(line, "");
        let clean = normalize_whitespace(&clean);

        let Some(caps) = self.row_re.captures(&clean) else {
            return RowParse::Skip;
        };

        let name = caps[1].to_string();
        let mut url = caps[2].to_string();
        let description = caps[3].to_string();

        // Relative links point into the official repository tree.
        if url.starts_with("src/") {
            url = format!("{}/{}", OFFICIAL_REPO_BASE, url);
        }

        RowParse::Entry(ServerEntry {
            name,
            description,
            url,
            category: category.to_string(),
            source: self.label().to_string(),
        })
    }
}

impl Default for OfficialSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerSource for OfficialSource {
    fn name(&self) -> &str {
        "Official MCP Servers"
    }

    fn label(&self) -> &str {
        "official"
    }

    fn url(&self) -> &str {
        "https://raw.githubusercontent.com/modelcontextprotocol/servers/refs/heads/main/README.md"
    }

    fn parse(&self, content: &str) -> Vec<ServerEntry> {
        let mut entries = Vec::new();
        let mut category: Option<&str> = None;
        let mut skipped = 0usize;

        for line in content.lines() {
            let line = line.trim();

            if line.starts_with("## 🌟 Reference Servers") {
                category = Some("reference");
                continue;
            } else if line.starts_with("### Archived") {
                category = Some("archived");
                continue;
            } else if line.starts_with("### 🎖️ Official Integrations") {
                category = Some("official");
                continue;
            } else if line.starts_with("### 🌎 Community Servers") {
                category = Some("community");
                continue;
            }

            if let (true, Some(cat)) = (line.starts_with("- "), category) {
                match self.parse_row(line, cat) {
                    RowParse::Entry(entry) => entries.push(entry),
                    RowParse::Skip => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            debug!(source = self.name(), skipped, "skipped malformed rows");
        }
        entries
    }
}

// ============ Awesome listings ============

/// The `punkpeye/awesome-mcp-servers` README.
///
/// Category headings are `## <emoji> Name`; the heading text is normalized
/// to a kebab-case tag. Rows carry language/deployment icon decorations that
/// are stripped from the description.
pub struct PunkpeyeAwesomeSource {
    heading_re: Regex,
    link_re: Regex,
    tag_clean_re: Regex,
    desc_clean_re: Regex,
}

impl PunkpeyeAwesomeSource {
    pub fn new() -> Self {
        Self {
            heading_re: Regex::new(r"^##\s*[\w\s]*?\s*(.+?)(?:\s*\(.*\))?$").unwrap(),
            link_re: Regex::new(r"\[([^\]]+)\]\((https://github\.com/[^)]+)\)").unwrap(),
            tag_clean_re: Regex::new(r"[^\w\s-]").unwrap(),
            desc_clean_re: Regex::new(r"[^\w\s.,!?()-]").unwrap(),
        }
    }

    fn parse_row(&self, line: &str, category: &str) -> RowParse {
        let content = line[2..].trim();

        let Some(caps) = self.link_re.captures(content) else {
            return RowParse::Skip;
        };
        let name = caps[1].to_string();
        let url = caps[2].to_string();

        // Icon decorations sit between the link and the `-` separator, so
        // strip them before looking for the separator.
        let rest = content[caps.get(0).unwrap().end()..].trim();
        let cleaned = normalize_whitespace(&self.desc_clean_re.replace_all(rest, ""));
        let mut description = cleaned.trim_start_matches('-').trim_start().to_string();
        if description.is_empty() {
            description = format!("MCP server for {}", category);
        }

        RowParse::Entry(ServerEntry {
            name,
            description,
            url,
            category: category.to_string(),
            source: self.label().to_string(),
        })
    }

    fn heading_tag(&self, line: &str) -> Option<String> {
        let caps = self.heading_re.captures(line)?;
        let tag = self.tag_clean_re.replace_all(&caps[1], "");
        let tag = tag.trim().to_lowercase().replace(' ', "-");
        if tag.is_empty() {
            None
        } else {
            Some(tag)
        }
    }
}

impl Default for PunkpeyeAwesomeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerSource for PunkpeyeAwesomeSource {
    fn name(&self) -> &str {
        "Punkpeye Awesome MCP Servers"
    }

    fn label(&self) -> &str {
        "punkpeye-awesome"
    }

    fn url(&self) -> &str {
        "https://raw.githubusercontent.com/punkpeye/awesome-mcp-servers/main/README.md"
    }

    fn parse(&self, content: &str) -> Vec<ServerEntry> {
        let mut entries = Vec::new();
        let mut category: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();

            if line.starts_with("## ") && !line.starts_with("### ") {
                if let Some(tag) = self.heading_tag(line) {
                    category = Some(tag);
                }
                continue;
            }

            if let (true, Some(cat)) = (line.starts_with("- "), category.as_deref()) {
                if let RowParse::Entry(entry) = self.parse_row(line, cat) {
                    entries.push(entry);
                }
            }
        }

        entries
    }
}

/// The `appcypher/awesome-mcp-servers` README.
///
/// Same row shape as punkpeye but with inline `<img>` icons and plain `## `
/// headings.
pub struct AppcypherAwesomeSource {
    img_re: Regex,
    link_re: Regex,
    tag_clean_re: Regex,
}

impl AppcypherAwesomeSource {
    pub fn new() -> Self {
        Self {
            img_re: Regex::new(r"<img[^>]*?>").unwrap(),
            link_re: Regex::new(r"\[([^\]]+)\]\((https://github\.com/[^)]+)\)").unwrap(),
            tag_clean_re: Regex::new(r"[^\w\s-]").unwrap(),
        }
    }

    fn parse_row(&self, line: &str, category: &str) -> RowParse {
        let content = self.img_re.replace_all(line[2..].trim(), "");
        let content = content.trim();

        let Some(caps) = self.link_re.captures(content) else {
            return RowParse::Skip;
        };
        let name = caps[1].to_string();
        let url = caps[2].to_string();

        let mut rest = content[caps.get(0).unwrap().end()..].trim();
        rest = rest
            .strip_prefix("- ")
            .or_else(|| rest.strip_prefix("-"))
            .unwrap_or(rest)
            .trim();

        let description = if rest.is_empty() {
            format!("MCP server for {}", category)
        } else {
            normalize_whitespace(rest)
        };

        RowParse::Entry(ServerEntry {
            name,
            description,
            url,
            category: category.to_string(),
            source: self.label().to_string(),
        })
    }
}

impl Default for AppcypherAwesomeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerSource for AppcypherAwesomeSource {
    fn name(&self) -> &str {
        "Appcypher Awesome MCP Servers"
    }

    fn label(&self) -> &str {
        "appcypher-awesome"
    }

    fn url(&self) -> &str {
        "https://raw.githubusercontent.com/appcypher/awesome-mcp-servers/main/README.md"
    }

    fn parse(&self, content: &str) -> Vec<ServerEntry> {
        let mut entries = Vec::new();
        let mut category: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();

            if line.starts_with("## ") && !line.starts_with("### ") {
                let tag = self.tag_clean_re.replace_all(&line[3..], "");
                let tag = tag.trim().to_lowercase().replace(' ', "-");
                if !tag.is_empty() {
                    category = Some(tag);
                }
                continue;
            }

            if let (true, Some(cat)) = (line.starts_with("- "), category.as_deref()) {
                if let RowParse::Entry(entry) = self.parse_row(line, cat) {
                    entries.push(entry);
                }
            }
        }

        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFICIAL_SAMPLE: &str = "\
# MCP Servers

## 🌟 Reference Servers

- **[Fetch](src/fetch)** - Web content fetching and conversion for efficient LLM usage
- **[Filesystem](src/filesystem)** - Secure file operations with configurable access controls
- this row has no bold link and must be skipped

### 🎖️ Official Integrations

- <img height=\"12\" src=\"logo.png\" /> **[Weather API](https://example.com/weather)** - Real-time weather forecasts

### 🌎 Community Servers

- **[mcp-weather](https://github.com/example/mcp-weather)** - Weather API integration for forecasts
";

    const PUNKPEYE_SAMPLE: &str = "\
# Awesome MCP Servers

## 🗄️ Databases

- [postgres-mcp](https://github.com/example/postgres-mcp) 🐍 ☁️ - Query PostgreSQL databases safely
- [bare-link](https://github.com/example/bare-link)
- [not a github link](https://gitlab.com/x/y) - Should be skipped

### Subsection heading must not change the category

- [sqlite-mcp](https://github.com/example/sqlite-mcp) - SQLite operations
";

    const APPCYPHER_SAMPLE: &str = "\
# Awesome MCP Servers

## File Systems

- <img src=\"icon.png\" /> [fs-server](https://github.com/example/fs-server) - Local filesystem access
- [no-desc](https://github.com/example/no-desc)
";

    #[test]
    fn official_parses_sections_and_resolves_relative_urls() {
        let source = OfficialSource::new();
        let entries = source.parse(OFFICIAL_SAMPLE);
        assert_eq!(entries.len(), 4);

        let fetch = &entries[0];
        assert_eq!(fetch.name, "Fetch");
        assert_eq!(fetch.category, "reference");
        assert_eq!(
            fetch.url,
            "https://github.com/modelcontextprotocol/servers/tree/main/src/fetch"
        );
        assert_eq!(fetch.source, "official");

        assert_eq!(entries[2].category, "official");
        assert_eq!(entries[2].name, "Weather API");
        assert_eq!(entries[3].category, "community");
    }

    #[test]
    fn official_skips_malformed_rows_without_failing() {
        let source = OfficialSource::new();
        let entries = source.parse(
            "## 🌟 Reference Servers\n- completely malformed\n- **[Ok](src/ok)** - Fine\n",
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Ok");
    }

    #[test]
    fn official_rows_outside_any_section_are_skipped() {
        let source = OfficialSource::new();
        let entries = source.parse("- **[Orphan](https://example.com)** - No section yet\n");
        assert!(entries.is_empty());
    }

    #[test]
    fn punkpeye_normalizes_categories_and_cleans_descriptions() {
        let source = PunkpeyeAwesomeSource::new();
        let entries = source.parse(PUNKPEYE_SAMPLE);
        assert_eq!(entries.len(), 3);

        let pg = &entries[0];
        assert_eq!(pg.name, "postgres-mcp");
        assert_eq!(pg.category, "databases");
        assert_eq!(pg.description, "Query PostgreSQL databases safely");
        assert_eq!(pg.source, "punkpeye-awesome");

        // No description on the row -> generated one.
        assert_eq!(entries[1].description, "MCP server for databases");

        // Subsection heading kept the current category.
        assert_eq!(entries[2].name, "sqlite-mcp");
        assert_eq!(entries[2].category, "databases");
    }

    #[test]
    fn appcypher_strips_icons_and_generates_descriptions() {
        let source = AppcypherAwesomeSource::new();
        let entries = source.parse(APPCYPHER_SAMPLE);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].name, "fs-server");
        assert_eq!(entries[0].category, "file-systems");
        assert_eq!(entries[0].description, "Local filesystem access");
        assert_eq!(entries[1].description, "MCP server for file-systems");
    }

    #[test]
    fn all_sources_have_distinct_labels() {
        let sources = all_sources();
        let mut labels: Vec<&str> = sources.iter().map(|s| s.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), sources.len());
    }
}
