//! Doc-block parsing for action declarations.
//!
//! Understands Google-style sections (`Args:`, `Returns:`) and the rustdoc
//! conventions (`# Arguments` with `` * `name` - text `` bullets, `# Returns`).
//! Only what the schemas need is extracted: a summary, one description per
//! parameter and the description of the return value.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Description,
    Args,
    Returns,
    Other,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DocBlock {
    /// First paragraph, joined on one line.
    pub summary: String,
    /// Every paragraph before the first section.
    pub description: String,
    pub params: HashMap<String, String>,
    pub returns: Option<String>,
}

impl DocBlock {
    pub fn parse(text: &str) -> Self {
        let mut doc = DocBlock::default();
        let mut section = Section::Description;
        let mut paragraphs: Vec<Vec<&str>> = vec![Vec::new()];
        let mut entry_indent: Option<usize> = None;
        let mut current: Option<String> = None;
        let mut returns: Vec<&str> = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if let Some(next) = section_header(trimmed) {
                section = next;
                entry_indent = None;
                current = None;
                continue;
            }
            if trimmed.is_empty() {
                if section == Section::Description {
                    paragraphs.push(Vec::new());
                }
                continue;
            }

            match section {
                Section::Description => {
                    if let Some(last) = paragraphs.last_mut() {
                        last.push(trimmed);
                    }
                }
                Section::Args => {
                    let indent = line.len() - line.trim_start().len();
                    let starts_entry = match entry_indent {
                        None => true,
                        Some(base) => indent <= base,
                    };
                    if starts_entry {
                        if let Some((name, text)) = parse_entry(trimmed) {
                            entry_indent = Some(indent);
                            doc.params.insert(name.clone(), text);
                            current = Some(name);
                            continue;
                        }
                    }
                    if let Some(name) = &current {
                        if let Some(text) = doc.params.get_mut(name) {
                            append(text, trimmed);
                        }
                    }
                }
                Section::Returns if returns.is_empty() => {
                    returns.push(strip_return_type(trimmed))
                }
                Section::Returns => returns.push(trimmed),
                Section::Other => {}
            }
        }

        let paragraphs: Vec<String> = paragraphs
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.join(" "))
            .collect();
        doc.summary = paragraphs.first().cloned().unwrap_or_default();
        doc.description = paragraphs.join("\n\n");
        if !returns.is_empty() {
            doc.returns = Some(returns.join(" "));
        }
        doc
    }

    /// Description of a parameter, empty when undocumented.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or("")
    }

    pub fn returns(&self) -> &str {
        self.returns.as_deref().unwrap_or("")
    }
}

fn section_header(line: &str) -> Option<Section> {
    let name = if let Some(rest) = line.strip_prefix('#') {
        rest.trim_start_matches('#').trim()
    } else if let Some(name) = line.strip_suffix(':') {
        // "Args:" but not "a: text"
        if name.contains(' ') && !name.eq_ignore_ascii_case("keyword args") {
            return None;
        }
        name
    } else {
        return None;
    };

    match name.to_ascii_lowercase().as_str() {
        "args" | "arguments" | "parameters" | "params" | "keyword args" => Some(Section::Args),
        "returns" | "return" => Some(Section::Returns),
        "raises" | "errors" | "panics" | "examples" | "example" | "note" | "notes"
        | "safety" | "yields" => Some(Section::Other),
        _ if line.starts_with('#') => Some(Section::Other),
        _ => None,
    }
}

/// `name: text`, `name (type): text`, `` * `name` - text `` or `- name: text`.
fn parse_entry(line: &str) -> Option<(String, String)> {
    let line = line
        .strip_prefix("* ")
        .or_else(|| line.strip_prefix("- "))
        .unwrap_or(line)
        .trim_start();

    let (name, rest) = if let Some(quoted) = line.strip_prefix('`') {
        let end = quoted.find('`')?;
        (&quoted[..end], &quoted[end + 1..])
    } else {
        let colon = line.find(':')?;
        let head = line[..colon].split_whitespace().next()?;
        (head, &line[colon + 1..])
    };

    let name = name.trim_start_matches('*');
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let text = rest.trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace());
    Some((name.to_string(), text.trim_end().to_string()))
}

/// `int: The sum.` -> `The sum.`; lines without a type prefix are kept.
fn strip_return_type(line: &str) -> &str {
    let Some((head, rest)) = line.split_once(':') else {
        return line;
    };
    let is_type = !head.is_empty()
        && (!head.contains(char::is_whitespace) || head.contains(['[', '<']))
        && head
            .chars()
            .all(|c| c.is_alphanumeric() || "_[]<>(),.|& ".contains(c));
    let rest = rest.trim_start();
    if is_type && !rest.is_empty() {
        rest
    } else {
        line
    }
}

fn append(text: &mut String, more: &str) {
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(more);
}
