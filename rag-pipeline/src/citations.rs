//! Citation marker extraction and passage matching.
//!
//! Markers look like `[Chapter 3, Section 2]`, `[Chapter 3]` or `[Section 2]`
//! (any case). Each distinct marker resolves to one passage; when none of the
//! passages carries a matching number the first retrieved passage is cited.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::models::{Citation, RetrievedPassage};

static MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(?:Chapter\s+(\d+))?(?:,\s*)?(?:Section\s+(\d+))?\]").ok()
});

static NON_SLUG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^a-z0-9\-]").ok());

const CHAPTER_WEIGHT: u32 = 10;
const SECTION_WEIGHT: u32 = 5;

/// Resolves every distinct marker in `text` against `passages`, in order of first appearance.
pub fn extract_citations(text: &str, passages: &[RetrievedPassage]) -> Vec<Citation> {
    let (Some(re), Some(first)) = (MARKER.as_ref(), passages.first()) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in re.captures_iter(text) {
        let chapter = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let section = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        if chapter.is_none() && section.is_none() {
            continue;
        }
        let key = marker_key(chapter, section);
        if !seen.insert(key.clone()) {
            continue;
        }
        let passage = best_match(chapter, section, passages).unwrap_or(first);
        out.push(build_citation(&key, chapter, section, passage));
    }
    out
}

/// Highest-scoring passage; earliest wins ties. `None` when nothing scores.
fn best_match<'a>(
    chapter: Option<u32>,
    section: Option<u32>,
    passages: &'a [RetrievedPassage],
) -> Option<&'a RetrievedPassage> {
    let mut best: Option<(&RetrievedPassage, u32)> = None;
    for p in passages {
        let mut score = 0;
        if chapter.is_some() && p.chapter_number == chapter {
            score += CHAPTER_WEIGHT;
        }
        if section.is_some() && p.section_number == section {
            score += SECTION_WEIGHT;
        }
        if score > best.map_or(0, |(_, s)| s) {
            best = Some((p, score));
        }
    }
    best.map(|(p, _)| p)
}

fn marker_key(chapter: Option<u32>, section: Option<u32>) -> String {
    let part = |n: Option<u32>| n.map_or_else(|| "all".to_string(), |v| v.to_string());
    format!("{}:{}", part(chapter), part(section))
}

fn display_text(chapter: Option<u32>, section: Option<u32>) -> String {
    let mut parts = Vec::with_capacity(2);
    if let Some(c) = chapter {
        parts.push(format!("Chapter {c}"));
    }
    if let Some(s) = section {
        parts.push(format!("Section {s}"));
    }
    parts.join(", ")
}

fn build_citation(
    key: &str,
    chapter: Option<u32>,
    section: Option<u32>,
    passage: &RetrievedPassage,
) -> Citation {
    let url = match passage.doc_url.as_deref() {
        Some(u) if u.starts_with("/docs/") => u.to_string(),
        _ => docs_url(
            passage.chapter_number.or(chapter),
            passage.section_number.or(section),
            passage.heading.as_deref(),
        ),
    };
    let chapter_label = passage.chapter.clone().unwrap_or_else(|| match chapter {
        Some(c) => format!("Chapter {c}"),
        None => "Chapter ?".to_string(),
    });
    let id_seed = format!("{}|{}", passage.embedding_id, key);

    Citation {
        id: Uuid::new_v5(&Uuid::NAMESPACE_OID, id_seed.as_bytes()),
        text: display_text(chapter, section),
        url,
        chapter: chapter_label,
        chapter_number: chapter.unwrap_or(0),
        section: passage.section.clone(),
        section_number: section,
        heading: passage.heading.clone(),
    }
}

/// Site path for a chapter, anchored at a section or a slugged heading.
///
/// ```
/// # use rag_pipeline::citations::docs_url;
/// assert_eq!(docs_url(Some(3), Some(2), Some("Analytical IK")), "/docs/chapter-3#section-2");
/// assert_eq!(docs_url(Some(3), None, Some("Analytical IK")), "/docs/chapter-3#analytical-ik");
/// ```
pub fn docs_url(chapter: Option<u32>, section: Option<u32>, heading: Option<&str>) -> String {
    let Some(ch) = chapter else {
        return "/docs/unknown".to_string();
    };
    let mut url = format!("/docs/chapter-{ch}");
    if let Some(sec) = section {
        url.push_str(&format!("#section-{sec}"));
    } else if let Some(h) = heading {
        let slug = slugify(h);
        if !slug.is_empty() {
            url.push('#');
            url.push_str(&slug);
        }
    }
    url
}

fn slugify(heading: &str) -> String {
    let lowered = heading.to_lowercase().replace([' ', '_'], "-");
    match NON_SLUG.as_ref() {
        Some(re) => re.replace_all(&lowered, "").into_owned(),
        None => lowered,
    }
}
