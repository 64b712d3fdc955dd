//! Choice candidates as completion items

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind};

/// Completion items for a choice tabstop.
///
/// Without `typed` every choice is offered; otherwise only choices starting
/// with the typed text. `sort_text` keeps the declared order.
pub fn candidates(choices: &[String], typed: Option<&str>) -> Vec<CompletionItem> {
    choices
        .iter()
        .enumerate()
        .filter(|(_, choice)| typed.map_or(true, |typed| choice.starts_with(typed)))
        .map(|(index, choice)| CompletionItem {
            label: choice.clone(),
            kind: Some(CompletionItemKind::ENUM_MEMBER),
            sort_text: Some(format!("{index:05}")),
            filter_text: Some(choice.clone()),
            insert_text: Some(choice.clone()),
            ..CompletionItem::default()
        })
        .collect()
}
