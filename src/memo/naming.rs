//! Stored file names and title normalization

use crate::config::DateTokenPolicy;
use chrono::Local;
use regex::Regex;

/// Longest sanitized base name kept in a stored file name (in characters)
pub const MAX_BASE_NAME_CHARS: usize = 50;

const DATE_TOKEN_FORMAT: &str = "%Y-%m-%d";

// ─── DateStamp ───────────────────────────────────────────────────────────────

/// Source of the date token embedded in stored file names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateStamp {
    /// Today's date, read on every call
    PerRequest,
    /// A date fixed when the stamp was created
    Fixed(String),
}

impl DateStamp {
    /// `Startup` freezes today's date now; `PerRequest` reads the clock per call
    pub fn from_policy(policy: DateTokenPolicy) -> Self {
        match policy {
            DateTokenPolicy::PerRequest => DateStamp::PerRequest,
            DateTokenPolicy::Startup => DateStamp::Fixed(today()),
        }
    }

    pub fn token(&self) -> String {
        match self {
            DateStamp::PerRequest => today(),
            DateStamp::Fixed(token) => token.clone(),
        }
    }
}

fn today() -> String {
    Local::now().format(DATE_TOKEN_FORMAT).to_string()
}

// ─── FileNamer ───────────────────────────────────────────────────────────────

/// Derives stored file names: `<base>_<date>.pdf`
pub struct FileNamer {
    unsafe_chars: Regex,
    stamp: DateStamp,
}

impl FileNamer {
    pub fn new(stamp: DateStamp) -> Self {
        Self {
            unsafe_chars: Regex::new(r#"[<>:"/\\|?*]"#).unwrap(),
            stamp,
        }
    }

    /// Strip path separators and reserved characters, keep at most 50 chars
    pub fn sanitize(&self, name: &str) -> String {
        self.unsafe_chars
            .replace_all(name, "")
            .chars()
            .take(MAX_BASE_NAME_CHARS)
            .collect()
    }

    /// Name for a freshly uploaded file
    pub fn upload_name(&self, raw_file_name: &str) -> String {
        let base = self.sanitize(base_name_without_extension(raw_file_name));
        format!("{}_{}.pdf", base, self.stamp.token())
    }

    /// `n`-th alternative to a taken stored name: `<base>_<date>_<n>.pdf`
    pub fn numbered(name: &str, n: u32) -> String {
        let base = base_name_without_extension(name);
        format!("{}_{}{}", base, n, &name[base.len()..])
    }

    /// Name written by a metadata rename. The base is kept verbatim (not
    /// sanitized) and never touches the stored blob.
    pub fn rename(&self, supplied: &str) -> String {
        format!(
            "{}_{}.pdf",
            base_name_without_extension(supplied),
            self.stamp.token()
        )
    }
}

/// `name` without its last extension.
///
/// Only the final path component is inspected; leading dots of that
/// component (".profile") do not start an extension.
pub fn base_name_without_extension(name: &str) -> &str {
    let component_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    if let Some(dot) = name.rfind('.') {
        if dot >= component_start && name[component_start..dot].bytes().any(|b| b != b'.') {
            return &name[..dot];
        }
    }
    name
}

/// Trim, then upper-case the first letter of every word and lower-case the rest.
///
/// A word starts at any cased letter that does not follow another cased
/// letter, so "q3 report" becomes "Q3 Report" and "o'neil" becomes "O'Neil".
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_cased = false;

    for c in title.trim().chars() {
        let cased = c.is_lowercase() || c.is_uppercase();
        if cased && prev_cased {
            out.extend(c.to_lowercase());
        } else if cased {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_cased = cased;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namer() -> FileNamer {
        FileNamer::new(DateStamp::Fixed("2024-03-01".to_string()))
    }

    #[test]
    fn test_upload_name_keeps_spaces() {
        assert_eq!(namer().upload_name("Q3 Report.pdf"), "Q3 Report_2024-03-01.pdf");
    }

    #[test]
    fn test_sanitize_strips_reserved_characters() {
        let namer = namer();
        assert_eq!(namer.sanitize(r#"a<b>c:d"e/f\g|h?i*j"#), "abcdefghij");
        assert_eq!(namer.upload_name("../../etc/passwd.pdf"), "....etcpasswd_2024-03-01.pdf");
    }

    #[test]
    fn test_sanitize_truncates_to_fifty_chars() {
        let long = "é".repeat(80);
        let name = namer().sanitize(&long);
        assert_eq!(name.chars().count(), MAX_BASE_NAME_CHARS);
    }

    #[test]
    fn test_base_name_without_extension() {
        assert_eq!(base_name_without_extension("report.pdf"), "report");
        assert_eq!(base_name_without_extension("archive.tar.gz"), "archive.tar");
        assert_eq!(base_name_without_extension("noext"), "noext");
        assert_eq!(base_name_without_extension(".profile"), ".profile");
        assert_eq!(base_name_without_extension("..hidden.pdf"), "..hidden");
        assert_eq!(base_name_without_extension("dir.v2/file"), "dir.v2/file");
        assert_eq!(base_name_without_extension("dir/file.pdf"), "dir/file");
    }

    #[test]
    fn test_numbered_inserts_counter_before_extension() {
        assert_eq!(
            FileNamer::numbered("dup_2024-03-01.pdf", 2),
            "dup_2024-03-01_2.pdf"
        );
        assert_eq!(FileNamer::numbered("v1.2_2024-03-01.pdf", 3), "v1.2_2024-03-01_3.pdf");
    }

    #[test]
    fn test_rename_is_not_sanitized() {
        assert_eq!(namer().rename("Final: v2.pdf"), "Final: v2_2024-03-01.pdf");
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  q3 report "), "Q3 Report");
        assert_eq!(normalize_title("BOARD minutes"), "Board Minutes");
        assert_eq!(normalize_title("o'neil memo"), "O'Neil Memo");
        assert_eq!(normalize_title("3d plan"), "3D Plan");
        assert_eq!(normalize_title(""), "");
    }

    #[test]
    fn test_date_stamp() {
        assert_eq!(DateStamp::Fixed("2020-01-02".to_string()).token(), "2020-01-02");
        assert_eq!(DateStamp::PerRequest.token().len(), 10);
        assert!(matches!(
            DateStamp::from_policy(DateTokenPolicy::Startup),
            DateStamp::Fixed(_)
        ));
        assert_eq!(
            DateStamp::from_policy(DateTokenPolicy::PerRequest),
            DateStamp::PerRequest
        );
    }
}
