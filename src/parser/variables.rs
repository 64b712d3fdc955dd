//! Built-in snippet variables
//!
//! These names are resolved from the editing [`Context`] when no
//! user-supplied lookup entry exists. Any other name falls back to the
//! process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

/// Editing context a snippet is expanded in
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub language_id: Option<String>,
    pub file_path: Option<PathBuf>,
    pub workspace_folder: Option<PathBuf>,
    /// Text of the line the cursor is on
    pub current_line: String,
    /// Cursor column in characters
    pub cursor_column: usize,
    /// Zero-based line index of the cursor
    pub line_index: usize,
    pub selected_text: Option<String>,
    pub clipboard: Option<String>,
    pub line_comment: Option<String>,
    pub block_comment: Option<(String, String)>,
}

type Resolver = fn(&Context) -> Option<String>;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"\w+").unwrap();

    /// Reserved variable names and how to compute them
    static ref BUILTINS: HashMap<&'static str, Resolver> = {
        let mut table: HashMap<&'static str, Resolver> = HashMap::new();
        // Editor context
        table.insert("TM_SELECTED_TEXT", |ctx| ctx.selected_text.clone());
        table.insert("TM_CURRENT_LINE", |ctx| Some(ctx.current_line.clone()));
        table.insert("TM_CURRENT_WORD", current_word);
        table.insert("TM_LINE_INDEX", |ctx| Some(ctx.line_index.to_string()));
        table.insert("TM_LINE_NUMBER", |ctx| Some((ctx.line_index + 1).to_string()));
        table.insert("CLIPBOARD", |ctx| ctx.clipboard.clone());
        // Paths
        table.insert("TM_FILENAME", |ctx| file_name(ctx.file_path.as_deref()?));
        table.insert("TM_FILENAME_BASE", |ctx| {
            Some(ctx.file_path.as_deref()?.file_stem()?.to_string_lossy().into_owned())
        });
        table.insert("TM_DIRECTORY", |ctx| {
            Some(ctx.file_path.as_deref()?.parent()?.display().to_string())
        });
        table.insert("TM_FILEPATH", |ctx| Some(ctx.file_path.as_deref()?.display().to_string()));
        table.insert("WORKSPACE_NAME", |ctx| file_name(ctx.workspace_folder.as_deref()?));
        table.insert("WORKSPACE_FOLDER", |ctx| {
            Some(ctx.workspace_folder.as_deref()?.display().to_string())
        });
        // Date and time
        table.insert("CURRENT_YEAR", |_| Some(now_formatted("%Y")));
        table.insert("CURRENT_YEAR_SHORT", |_| Some(now_formatted("%y")));
        table.insert("CURRENT_MONTH", |_| Some(now_formatted("%m")));
        table.insert("CURRENT_MONTH_NAME", |_| Some(now_formatted("%B")));
        table.insert("CURRENT_MONTH_NAME_SHORT", |_| Some(now_formatted("%b")));
        table.insert("CURRENT_DATE", |_| Some(now_formatted("%d")));
        table.insert("CURRENT_DAY_NAME", |_| Some(now_formatted("%A")));
        table.insert("CURRENT_DAY_NAME_SHORT", |_| Some(now_formatted("%a")));
        table.insert("CURRENT_HOUR", |_| Some(now_formatted("%H")));
        table.insert("CURRENT_MINUTE", |_| Some(now_formatted("%M")));
        table.insert("CURRENT_SECOND", |_| Some(now_formatted("%S")));
        table.insert("CURRENT_SECONDS_UNIX", |_| Some(now().timestamp().to_string()));
        table.insert("CURRENT_TIMEZONE_OFFSET", |_| Some(now_formatted("%:z")));
        // Random values
        table.insert("RANDOM", |_| Some(random_digits(6, 10)));
        table.insert("RANDOM_HEX", |_| Some(random_digits(6, 16)));
        table.insert("UUID", |_| Some(uuid_v4()));
        // Comments
        table.insert("LINE_COMMENT", |ctx| ctx.line_comment.clone());
        table.insert("BLOCK_COMMENT_START", |ctx| Some(ctx.block_comment.as_ref()?.0.clone()));
        table.insert("BLOCK_COMMENT_END", |ctx| Some(ctx.block_comment.as_ref()?.1.clone()));
        table
    };
}

/// Resolve a variable from the built-in table, then the environment.
///
/// Returns `None` when the variable has no value.
pub fn resolve(name: &str, ctx: &Context) -> Option<String> {
    match BUILTINS.get(name) {
        Some(resolver) => resolver(ctx),
        None => std::env::var(name).ok(),
    }
}

fn now() -> DateTime<Local> {
    Local::now()
}

fn now_formatted(format: &str) -> String {
    now().format(format).to_string()
}

fn file_name(path: &Path) -> Option<String> {
    Some(path.file_name()?.to_string_lossy().into_owned())
}

/// Word under (or right before) the cursor
fn current_word(ctx: &Context) -> Option<String> {
    let column = ctx
        .current_line
        .char_indices()
        .nth(ctx.cursor_column)
        .map_or(ctx.current_line.len(), |(offset, _)| offset);

    WORD_RE
        .find_iter(&ctx.current_line)
        .find(|m| m.start() <= column && column <= m.end())
        .map(|m| m.as_str().to_string())
}

fn random_digits(count: usize, radix: u32) -> String {
    let mut rng = SmallRng::from_os_rng();
    (0..count)
        .filter_map(|_| char::from_digit(rng.random_range(0..radix), radix))
        .collect()
}

fn uuid_v4() -> String {
    let mut rng = SmallRng::from_os_rng();
    let mut bytes: [u8; 16] = rng.random();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context {
            file_path: Some(PathBuf::from("/work/project/src/main.rs")),
            workspace_folder: Some(PathBuf::from("/work/project")),
            current_line: "let value = other".to_string(),
            cursor_column: 6,
            line_index: 4,
            line_comment: Some("//".to_string()),
            block_comment: Some(("/*".to_string(), "*/".to_string())),
            ..Context::default()
        }
    }

    #[test]
    fn test_path_variables() {
        let ctx = context();
        assert_eq!(resolve("TM_FILENAME", &ctx).as_deref(), Some("main.rs"));
        assert_eq!(resolve("TM_FILENAME_BASE", &ctx).as_deref(), Some("main"));
        assert_eq!(
            resolve("TM_DIRECTORY", &ctx).as_deref(),
            Some("/work/project/src")
        );
        assert_eq!(resolve("WORKSPACE_NAME", &ctx).as_deref(), Some("project"));
    }

    #[test]
    fn test_line_variables() {
        let ctx = context();
        assert_eq!(resolve("TM_LINE_INDEX", &ctx).as_deref(), Some("4"));
        assert_eq!(resolve("TM_LINE_NUMBER", &ctx).as_deref(), Some("5"));
        assert_eq!(resolve("TM_CURRENT_WORD", &ctx).as_deref(), Some("value"));
        assert_eq!(
            resolve("TM_CURRENT_LINE", &ctx).as_deref(),
            Some("let value = other")
        );
    }

    #[test]
    fn test_missing_context_values_are_unresolved() {
        let ctx = Context::default();
        assert_eq!(resolve("TM_SELECTED_TEXT", &ctx), None);
        assert_eq!(resolve("TM_FILENAME", &ctx), None);
        assert_eq!(resolve("BLOCK_COMMENT_END", &ctx), None);
    }

    #[test]
    fn test_comment_variables() {
        let ctx = context();
        assert_eq!(resolve("LINE_COMMENT", &ctx).as_deref(), Some("//"));
        assert_eq!(resolve("BLOCK_COMMENT_START", &ctx).as_deref(), Some("/*"));
    }

    #[test]
    fn test_random_shapes() {
        let ctx = Context::default();
        let random = resolve("RANDOM", &ctx).unwrap();
        assert_eq!(random.len(), 6);
        assert!(random.chars().all(|c| c.is_ascii_digit()));

        let hex = resolve("RANDOM_HEX", &ctx).unwrap();
        assert_eq!(hex.len(), 6);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        let uuid = resolve("UUID", &ctx).unwrap();
        let groups: Vec<_> = uuid.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert_eq!(&uuid[14..15], "4");
    }

    #[test]
    fn test_date_variables() {
        let ctx = Context::default();
        let year = resolve("CURRENT_YEAR", &ctx).unwrap();
        assert_eq!(year.len(), 4);
        assert_eq!(resolve("CURRENT_YEAR_SHORT", &ctx).unwrap().len(), 2);
        assert!(resolve("CURRENT_SECONDS_UNIX", &ctx)
            .unwrap()
            .parse::<i64>()
            .is_ok());
    }

    #[test]
    fn test_environment_fallback() {
        assert_eq!(resolve("PATH", &Context::default()), std::env::var("PATH").ok());
        assert_eq!(
            resolve("SNIPPET_SESSION_SURELY_UNSET_VARIABLE", &Context::default()),
            None
        );
    }
}
