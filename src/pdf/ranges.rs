//! Page range grammar for split and rotate

use crate::error::{Error, Result};

/// Parse split groups into lists of 1-indexed page numbers.
///
/// Supports:
/// - `N` (single page group)
/// - `A-B` (pages A..=B, clamped to the document)
/// - Comma-separated combinations
///
/// Groups that fall entirely outside the document are skipped. An empty
/// string, or one where no group survives, yields one group per page.
pub fn parse_split_ranges(ranges: Option<&str>, total_pages: u32) -> Result<Vec<Vec<u32>>> {
    let one_per_page = || (1..=total_pages).map(|p| vec![p]).collect::<Vec<_>>();

    let ranges = match ranges.map(str::trim) {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(one_per_page()),
    };

    let mut groups = Vec::new();
    for part in ranges.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let pages: Vec<u32> = match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_page_number(start, part)?.max(1);
                let end = parse_page_number(end, part)?.min(total_pages);
                (start..=end).collect()
            }
            None => {
                let page = parse_page_number(part, part)?;
                if (1..=total_pages).contains(&page) {
                    vec![page]
                } else {
                    Vec::new()
                }
            }
        };

        if !pages.is_empty() {
            groups.push(pages);
        }
    }

    if groups.is_empty() {
        return Ok(one_per_page());
    }
    Ok(groups)
}

/// Parse a rotate page selection: `all` (returns `None`) or a comma list of
/// 1-indexed page numbers. Pages beyond the document are dropped.
pub fn parse_page_selection(selection: &str, total_pages: u32) -> Result<Option<Vec<u32>>> {
    let selection = selection.trim();
    if selection.is_empty() || selection.eq_ignore_ascii_case("all") {
        return Ok(None);
    }

    let mut pages = Vec::new();
    for part in selection.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let page = parse_page_number(part, selection)?;
        if (1..=total_pages).contains(&page) && !pages.contains(&page) {
            pages.push(page);
        }
    }
    Ok(Some(pages))
}

/// Label for a group of pages: `3` or `1-4`
pub fn format_page_range(pages: &[u32]) -> String {
    match (pages.first(), pages.last()) {
        (Some(first), Some(last)) if first == last => first.to_string(),
        (Some(first), Some(last)) => format!("{}-{}", first, last),
        _ => String::new(),
    }
}

fn parse_page_number(s: &str, context: &str) -> Result<u32> {
    s.trim().parse().map_err(|_| Error::InvalidPageRange {
        range: context.to_string(),
    })
}
