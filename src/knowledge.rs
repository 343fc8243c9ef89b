//! Flat-file knowledge base with keyword search
//!
//! The file is plain text split into sections by heading lines ending in `:`.
//! Lines before the first heading belong to the `general` section.

use crate::Result;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Section holding lines that precede any heading
pub const GENERAL_SECTION: &str = "general";

/// Returned by [`KnowledgeBase::context`] when nothing was loaded
pub const EMPTY_CONTEXT: &str = "No information available.";

/// Returned by [`KnowledgeBase::search`] when no line matches
pub const NO_MATCH: &str = "No specific information found in the records.";

/// One headed block of the knowledge file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Lowercased heading without the trailing colon
    pub name: String,
    pub content: String,
}

impl Section {
    fn is_general(&self) -> bool {
        self.name == GENERAL_SECTION
    }

    fn lines(&self) -> impl Iterator<Item = &str> {
        self.content.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Result of a keyword search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeMatch {
    pub found: bool,
    pub content: String,
}

/// Parsed knowledge file
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    sections: Vec<Section>,
}

impl KnowledgeBase {
    /// Split `text` into sections.
    ///
    /// A repeated heading replaces the earlier section's content in place.
    pub fn parse(text: &str) -> Self {
        let mut kb = Self::default();
        let mut current = GENERAL_SECTION.to_string();
        let mut lines: Vec<&str> = Vec::new();

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(heading) = line.strip_suffix(':') {
                if !lines.is_empty() {
                    kb.insert(&current, lines.join("\n"));
                    lines.clear();
                }
                current = heading.to_lowercase();
            } else {
                lines.push(line);
            }
        }
        if !lines.is_empty() {
            kb.insert(&current, lines.join("\n"));
        }

        debug!(sections = kb.sections.len(), "parsed knowledge base");
        kb
    }

    /// Load and parse a knowledge file. A missing file yields an empty base.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Knowledge file {:?} not found, starting empty", path);
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).await?;
        Ok(Self::parse(&text))
    }

    fn insert(&mut self, name: &str, content: String) {
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(section) => section.content = content,
            None => self.sections.push(Section {
                name: name.to_string(),
                content,
            }),
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Every section rendered as `NAME:` followed by its lines
    pub fn context(&self) -> String {
        if self.sections.is_empty() {
            return EMPTY_CONTEXT.to_string();
        }

        let mut parts = Vec::new();
        for section in &self.sections {
            if !section.is_general() {
                parts.push(format!("{}:", section.name.to_uppercase()));
            }
            parts.push(section.content.clone());
            parts.push(String::new());
        }
        parts.join("\n")
    }

    /// Lines containing any whitespace-separated term of `query`, grouped by
    /// section. Falls back to word-level partial matching when nothing hits.
    pub fn search(&self, query: &str) -> KnowledgeMatch {
        let query = query.to_lowercase();
        let terms: Vec<&str> = query.split_whitespace().collect();

        let mut found = Vec::new();
        for section in &self.sections {
            let hits: Vec<&str> = section
                .lines()
                .filter(|line| {
                    let line = line.to_lowercase();
                    terms.iter().any(|term| line.contains(term))
                })
                .collect();
            if !hits.is_empty() {
                if !section.is_general() {
                    found.push(format!("\n{}:", section.name.to_uppercase()));
                }
                found.extend(hits.into_iter().map(str::to_string));
            }
        }

        if found.is_empty() {
            for section in &self.sections {
                for line in section.lines() {
                    let lower = line.to_lowercase();
                    let fuzzy = terms.iter().any(|term| {
                        lower
                            .split_whitespace()
                            .any(|word| word.contains(term) || term.contains(word))
                    });
                    if fuzzy {
                        if !section.is_general() {
                            found.push(format!("\n{}:", section.name.to_uppercase()));
                        }
                        found.push(line.to_string());
                    }
                }
            }
        }

        if found.is_empty() {
            KnowledgeMatch {
                found: false,
                content: NO_MATCH.to_string(),
            }
        } else {
            KnowledgeMatch {
                found: true,
                content: found.join("\n"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
Dhurkesh is a software engineer.

Experience:
Backend engineer at Acme, building Rust services
Intern at Initech

Skills:
Rust, Python, distributed systems
";

    #[test]
    fn test_parse_sections() {
        let kb = KnowledgeBase::parse(SAMPLE);
        let names: Vec<&str> = kb.sections().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["general", "experience", "skills"]);
        assert_eq!(
            kb.section("experience").unwrap().content,
            "Backend engineer at Acme, building Rust services\nIntern at Initech"
        );
    }

    #[test]
    fn test_repeated_heading_replaces_in_place() {
        let kb = KnowledgeBase::parse("A:\none\nB:\ntwo\nA:\nthree\n");
        let names: Vec<&str> = kb.sections().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(kb.section("a").unwrap().content, "three");
    }

    #[test]
    fn test_empty_heading_is_dropped() {
        let kb = KnowledgeBase::parse("Empty:\nFilled:\nyes\n");
        assert!(kb.section("empty").is_none());
        assert!(kb.section("filled").is_some());
    }

    #[test]
    fn test_context_rendering() {
        let kb = KnowledgeBase::parse(SAMPLE);
        let context = kb.context();
        assert!(context.starts_with("Dhurkesh is a software engineer.\n\nEXPERIENCE:\n"));
        assert!(context.contains("SKILLS:\nRust, Python, distributed systems"));
        assert_eq!(KnowledgeBase::default().context(), EMPTY_CONTEXT);
    }

    #[test]
    fn test_search_exact_terms() {
        let kb = KnowledgeBase::parse(SAMPLE);
        let result = kb.search("intern");
        assert!(result.found);
        assert_eq!(result.content, "\nEXPERIENCE:\nIntern at Initech");
    }

    #[test]
    fn test_search_fuzzy_fallback() {
        let kb = KnowledgeBase::parse("Skills:\nsystems\n");
        // No line contains "ecosystems", but the term contains the word "systems"
        let result = kb.search("ecosystems");
        assert!(result.found);
        assert!(result.content.contains("systems"));
    }

    #[test]
    fn test_search_no_match() {
        let kb = KnowledgeBase::parse(SAMPLE);
        let result = kb.search("zzz");
        assert!(!result.found);
        assert_eq!(result.content, NO_MATCH);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let kb = KnowledgeBase::load(Path::new("/nonexistent/info.txt")).await.unwrap();
        assert!(kb.is_empty());
    }
}
