use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Only the crate's own sources are policed.
const SOURCE_DIRS: [&str; 4] = ["ampute", "src", "tests", "benches"];

const FORBIDDEN_WORDS: [&str; 14] = [
    "FIXED",
    "CORRECTED",
    "FIX",
    "FIXES",
    "NEW",
    "CHANGED",
    "CHANGES",
    "CHANGE",
    "MODIFIED",
    "MODIFIES",
    "MODIFY",
    "UPDATED",
    "UPDATES",
    "UPDATE",
];

/// One source-policy rule: a line regex plus a second-stage filter on the matched line.
struct Rule {
    name: &'static str,
    pattern: String,
    accept: fn(&str) -> bool,
    include_build_script: bool,
    advice: &'static str,
}

// Collects every offending line of a single file.
struct ViolationCollector {
    accept: fn(&str) -> bool,
    violations: Vec<String>,
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.accept)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if let Err(e) = enforce_source_policy() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "underscore-prefixed identifiers",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            accept: is_code_match,
            include_build_script: true,
            advice: "Either use the variable (removing the underscore) or remove it completely.",
        },
        Rule {
            name: "forbidden comment words",
            pattern: format!(r"(//|/\*).*(?:{})", FORBIDDEN_WORDS.join("|")),
            accept: |_| true,
            include_build_script: false,
            advice: "Comments describe the code as it is, not its history. Remove them.",
        },
        Rule {
            name: "'**' in regular comments",
            pattern: r"(//|/\*).*\*\*".to_string(),
            accept: |line| !line.trim_start().starts_with("///"),
            include_build_script: false,
            advice: "'**' is only allowed in doc comments.",
        },
        Rule {
            name: "all-uppercase comments",
            pattern: r"(//|/\*).*".to_string(),
            accept: is_all_caps_comment,
            include_build_script: false,
            advice: "Strongly consider deleting the comment completely.",
        },
        Rule {
            name: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            accept: |_| true,
            include_build_script: false,
            advice: "Either use the code (removing the attribute) or remove it completely.",
        },
    ]
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_DIRS
        .iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| {
            WalkDir::new(dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
                .map(|e| e.into_path())
        })
        .collect()
}

fn enforce_source_policy() -> Result<(), Box<dyn Error>> {
    let sources = rust_sources();
    let mut searcher = Searcher::new();

    for rule in rules() {
        let matcher = RegexMatcher::new_line_matcher(&rule.pattern)?;
        let build_script = PathBuf::from("build.rs");
        let paths = sources
            .iter()
            .chain(rule.include_build_script.then_some(&build_script));

        for path in paths {
            let mut collector = ViolationCollector {
                accept: rule.accept,
                violations: Vec::new(),
            };
            searcher.search_path(&matcher, path, &mut collector)?;
            if !collector.violations.is_empty() {
                let mut message = format!(
                    "\n❌ ERROR: Found {} {} in {}:\n",
                    collector.violations.len(),
                    rule.name,
                    path.display()
                );
                for violation in &collector.violations {
                    message.push_str(&format!("   {violation}\n"));
                }
                message.push_str(&format!("\n⚠️ {}\n", rule.advice));
                return Err(message.into());
            }
        }
    }
    Ok(())
}

// Skips matches that sit in a comment or between quotes.
fn is_code_match(line: &str) -> bool {
    if line.trim_start().starts_with("//") || line.contains("/*") {
        return false;
    }
    let quoted = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !quoted
}

fn is_all_caps_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    let comment = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest
    } else if let Some(idx) = line.find("/*") {
        let rest = &line[idx + 2..];
        rest.find("*/").map_or(rest, |end| &rest[..end])
    } else {
        return false;
    };
    let mut letters = comment.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(|c| c.is_uppercase())
}
